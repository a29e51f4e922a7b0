//! Generation task endpoints.
//!
//! `POST /api/draw` submits a task through the lifecycle controller,
//! `POST /api/result` and `POST /api/cancel` address the tracked task by
//! id, `GET /api/plan` previews the stage schedule for a mode, and
//! `GET /api/events` streams task snapshots as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::routes::AppState;
use super::types::{ok, ApiError, Envelope};
use crate::generation::progress::{display_model, stage_label, DisplayModel};
use crate::generation::task::{TaskPhase, TaskSnapshot};
use crate::generation::{GenerationRequest, ResultItem, SubmitOptions};
use crate::workflow::{self, ExecMode, Stage};

/// Payload of a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitData {
    pub id: String,
}

/// Body addressing the tracked task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRefBody {
    #[serde(default)]
    pub id: String,
}

/// Task view returned by the result endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    pub id: String,

    /// Lifecycle phase on the studio side
    pub phase: TaskPhase,

    /// Last status reported by the remote pipeline
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    pub results: Vec<ResultItem>,

    #[serde(rename = "failure_reason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Duplicate of the failure reason under the older field name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Rendered stage chips and labels
    pub display: DisplayModel,
}

/// Payload of a cancel request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelData {
    pub id: String,

    /// Lifecycle phase after the cancel was processed
    pub status: TaskPhase,

    /// False when the task had already finished
    pub cancelled: bool,
}

/// Query parameters for the plan preview.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlanQuery {
    #[serde(default, alias = "expMode", alias = "exp_mode")]
    pub mode: Option<String>,

    #[serde(default, alias = "retrievalSetting", alias = "retrieval_setting")]
    pub retrieval_setting: Option<String>,

    #[serde(default, alias = "criticEnabled", alias = "critic_enabled")]
    pub critic_enabled: Option<bool>,

    #[serde(default, alias = "evalEnabled", alias = "eval_enabled")]
    pub eval_enabled: Option<bool>,

    #[serde(default, alias = "maxCriticRounds", alias = "max_critic_rounds")]
    pub max_critic_rounds: Option<i64>,
}

/// One scheduled stage with its display label.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStage {
    pub stage: Stage,
    pub label: &'static str,
}

/// Plan preview response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanData {
    /// Resolved execution mode
    pub mode: String,

    /// Critic rounds after mode gating and clamping
    pub critic_rounds: u8,

    pub stages: Vec<PlanStage>,
}

/// Submit a generation task.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(options): Json<SubmitOptions>,
) -> Result<Json<Envelope<SubmitData>>, ApiError> {
    let request = GenerationRequest::build(
        options,
        state.config.request_defaults(),
        &state.catalog,
        &state.config.limits,
    )?;
    let id = state.controller.submit(request).await?;
    Ok(ok(SubmitData { id }))
}

/// Report the state of the task with the given id.
pub async fn result(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TaskRefBody>,
) -> Result<Json<Envelope<ResultData>>, ApiError> {
    let id = body.id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("id is required"));
    }
    let snapshot = state.controller.snapshot().await;
    if snapshot.task_id.as_deref() != Some(id) {
        return Err(ApiError::not_found(format!("no task with id {}", id)));
    }
    Ok(ok(result_data(id.to_string(), &snapshot)))
}

fn result_data(id: String, snapshot: &TaskSnapshot) -> ResultData {
    let display = display_model(snapshot);
    ResultData {
        id,
        phase: snapshot.phase,
        status: snapshot.status.as_str().to_string(),
        stage: snapshot.stage.clone(),
        stage_message: snapshot.stage_message.clone(),
        progress: display.progress,
        results: snapshot.results.clone(),
        failure_reason: snapshot.failure_reason.clone(),
        error: snapshot.failure_reason.clone(),
        display,
    }
}

/// Request cancellation of the task with the given id.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TaskRefBody>,
) -> Result<Json<Envelope<CancelData>>, ApiError> {
    let id = body.id.trim().to_string();
    if id.is_empty() {
        return Err(ApiError::bad_request("id is required"));
    }
    let current = state.controller.snapshot().await;
    if current.task_id.as_deref() != Some(id.as_str()) {
        return Err(ApiError::not_found(format!("no task with id {}", id)));
    }
    let after = state
        .controller
        .cancel()
        .await
        .ok_or_else(|| ApiError::not_found(format!("no task with id {}", id)))?;
    let cancelled = after.phase == TaskPhase::Cancelled || after.cancel_requested;
    Ok(ok(CancelData {
        id,
        status: after.phase,
        cancelled,
    }))
}

/// Preview the stage schedule for a mode without submitting anything.
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlanQuery>,
) -> Json<PlanData> {
    let defaults = state.config.request_defaults();
    let mode = match query.mode.as_deref() {
        None | Some("") => defaults.exp_mode,
        Some(raw) => ExecMode::parse_or_full(raw),
    };
    let critic_enabled = query.critic_enabled.unwrap_or(true);
    let requested_rounds = query.max_critic_rounds.unwrap_or(3);
    let eval_enabled =
        query.eval_enabled.unwrap_or(defaults.eval_enabled) && !mode.forces_eval_off();

    let stages = workflow::plan(
        mode,
        query.retrieval_setting.as_deref(),
        critic_enabled,
        requested_rounds,
        eval_enabled,
    );
    let critic_rounds = workflow::effective_critic_rounds(mode, critic_enabled, requested_rounds);

    Json(PlanData {
        mode: mode.as_str().to_string(),
        critic_rounds,
        stages: stages
            .into_iter()
            .map(|stage| PlanStage {
                stage,
                label: stage_label(stage),
            })
            .collect(),
    })
}

/// Stream task snapshots as Server-Sent Events.
///
/// Opens with the current snapshot so a late subscriber starts in sync,
/// then forwards every published update until the client disconnects.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.controller.subscribe();
    let current = state.controller.published_snapshot().await;

    let stream = async_stream::stream! {
        if let Ok(json) = serde_json::to_string(&current) {
            yield Ok(Event::default().data(json));
        }

        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    if let Ok(json) = serde_json::to_string(&snapshot) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged, continuing");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
