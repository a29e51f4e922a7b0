//! Display-model assembly for the progress view.
//!
//! Turns a task snapshot into the renderable structure the UI consumes: a
//! title, a short status chip, an optional detail line and one chip per
//! planned stage. Pure; rendering decisions stay out of the lifecycle
//! machinery.

use serde::Serialize;

use crate::workflow::Stage;

use super::client::RemoteStatus;
use super::task::{TaskPhase, TaskSnapshot};

/// Human-readable label for a pipeline stage.
pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Queued => "Queued",
        Stage::Initializing => "Initializing",
        Stage::LoadingAgents => "Loading agents",
        Stage::Processing => "Running inference",
        Stage::ProcessingRetriever => "Retrieving references",
        Stage::ProcessingPlanner => "Planning figure",
        Stage::ProcessingStylist => "Applying style",
        Stage::ProcessingVisualizer => "Rendering figure",
        Stage::ProcessingCritic => "Critic review",
        Stage::ProcessingEval => "Evaluating output",
        Stage::Saving => "Saving outputs",
        Stage::Completed => "Completed",
        Stage::Failed => "Failed",
    }
}

/// How a planned stage is drawn in the stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMarker {
    Done,
    Current,
    Failed,
    Pending,
}

/// One entry of the stage list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageChip {
    pub stage: Stage,
    pub label: &'static str,
    pub marker: StageMarker,
}

/// Everything the progress view needs to render one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayModel {
    pub title: String,
    pub chip_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub stages: Vec<StageChip>,
}

/// Build the display model for a snapshot.
///
/// A reported stage outside the plan is rendered at the generic
/// in-progress position rather than rejected; while the task is live the
/// percentage is clamped into `1..=99` so the bar neither sits at zero nor
/// claims completion early.
pub fn display_model(snapshot: &TaskSnapshot) -> DisplayModel {
    let current = current_stage(snapshot);
    let current_index = current.and_then(|stage| snapshot.plan.iter().position(|s| *s == stage));

    let stages = snapshot
        .plan
        .iter()
        .enumerate()
        .map(|(position, &stage)| {
            let marker = match (snapshot.phase, current_index) {
                (TaskPhase::Succeeded, _) => StageMarker::Done,
                (_, Some(idx)) if position < idx => StageMarker::Done,
                (_, Some(idx)) if position == idx => match snapshot.phase {
                    TaskPhase::Failed => StageMarker::Failed,
                    TaskPhase::Submitting | TaskPhase::Polling => StageMarker::Current,
                    _ => StageMarker::Pending,
                },
                _ => StageMarker::Pending,
            };
            StageChip {
                stage,
                label: stage_label(stage),
                marker,
            }
        })
        .collect();

    DisplayModel {
        title: title_for(snapshot, current),
        chip_label: chip_label_for(snapshot),
        detail: detail_for(snapshot),
        progress: progress_for(snapshot),
        stages,
    }
}

/// The planned stage the task currently sits at, if any.
fn current_stage(snapshot: &TaskSnapshot) -> Option<Stage> {
    if snapshot.plan.is_empty() {
        return None;
    }
    let reported = snapshot
        .stage
        .as_deref()
        .and_then(Stage::parse)
        .filter(|stage| snapshot.plan.contains(stage));
    reported.or_else(|| {
        // Nothing usable reported yet: a queued task renders at the head of
        // the plan, anything further along at the generic processing slot.
        let fallback = match snapshot.status {
            RemoteStatus::Queued => Stage::Queued,
            _ => Stage::Processing,
        };
        snapshot.plan.iter().copied().find(|s| *s == fallback)
    })
}

fn title_for(snapshot: &TaskSnapshot, current: Option<Stage>) -> String {
    match snapshot.phase {
        TaskPhase::Idle => "Ready".to_string(),
        TaskPhase::Succeeded => stage_label(Stage::Completed).to_string(),
        TaskPhase::Failed => stage_label(Stage::Failed).to_string(),
        TaskPhase::Cancelled => "Cancelled".to_string(),
        TaskPhase::TimedOut => "Timed out".to_string(),
        TaskPhase::Submitting | TaskPhase::Polling => current
            .map(|stage| stage_label(stage).to_string())
            .unwrap_or_else(|| stage_label(Stage::Processing).to_string()),
    }
}

fn chip_label_for(snapshot: &TaskSnapshot) -> String {
    match snapshot.phase {
        TaskPhase::Idle => "Idle",
        TaskPhase::Submitting => "Submitting",
        TaskPhase::Polling => match snapshot.status {
            RemoteStatus::Queued => "Queued",
            _ => "Running",
        },
        TaskPhase::Succeeded => "Completed",
        TaskPhase::Failed => "Failed",
        TaskPhase::Cancelled => "Cancelled",
        TaskPhase::TimedOut => "Timed out",
    }
    .to_string()
}

fn detail_for(snapshot: &TaskSnapshot) -> Option<String> {
    match snapshot.phase {
        TaskPhase::Failed => snapshot
            .failure_reason
            .clone()
            .or_else(|| snapshot.stage_message.clone()),
        _ => snapshot.stage_message.clone(),
    }
}

fn progress_for(snapshot: &TaskSnapshot) -> Option<u8> {
    match snapshot.phase {
        TaskPhase::Succeeded => Some(100),
        TaskPhase::Submitting | TaskPhase::Polling => {
            snapshot.progress.map(|p| p.clamp(1, 99))
        }
        _ => snapshot.progress,
    }
}
