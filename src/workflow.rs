//! Pipeline workflow planning.
//!
//! Derives the ordered list of stages a generation task is expected to pass
//! through from the chosen execution mode and feature toggles. The plan is
//! advisory: it drives the pre-submission preview and classifies incoming
//! remote stage ids as known or unknown. The remote pipeline stays the
//! authority on what actually runs.

use serde::{Deserialize, Serialize};

/// Execution modes selectable for a pipeline run.
///
/// Unrecognized mode strings are treated as the full pipeline; see
/// [`ExecMode::parse_or_full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Visualizer only, no auxiliary agents
    Vanilla,
    /// Planner stage only
    DevPlanner,
    /// Planner followed by stylist
    DevPlannerStylist,
    /// Planner with critic loop
    DevPlannerCritic,
    /// Planner with critic loop, demo preset
    DemoPlannerCritic,
    /// Full pipeline
    DevFull,
    /// Full pipeline, demo preset
    DemoFull,
    /// Full pipeline driven by the retriever preset
    DevRetriever,
}

impl ExecMode {
    /// Wire identifier for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vanilla => "vanilla",
            Self::DevPlanner => "dev_planner",
            Self::DevPlannerStylist => "dev_planner_stylist",
            Self::DevPlannerCritic => "dev_planner_critic",
            Self::DemoPlannerCritic => "demo_planner_critic",
            Self::DevFull => "dev_full",
            Self::DemoFull => "demo_full",
            Self::DevRetriever => "dev_retriever",
        }
    }

    /// Parse a wire identifier. Returns `None` for unknown strings.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "vanilla" => Some(Self::Vanilla),
            "dev_planner" => Some(Self::DevPlanner),
            "dev_planner_stylist" => Some(Self::DevPlannerStylist),
            "dev_planner_critic" => Some(Self::DevPlannerCritic),
            "demo_planner_critic" => Some(Self::DemoPlannerCritic),
            "dev_full" => Some(Self::DevFull),
            "demo_full" => Some(Self::DemoFull),
            "dev_retriever" => Some(Self::DevRetriever),
            _ => None,
        }
    }

    /// Parse a wire identifier, falling back to the full pipeline for
    /// anything unrecognized.
    pub fn parse_or_full(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::DevFull)
    }

    /// Whether this mode runs a critic loop at all. Critic rounds are
    /// forced to zero for every other mode.
    pub fn critic_capable(self) -> bool {
        matches!(
            self,
            Self::DevFull | Self::DemoFull | Self::DevPlannerCritic | Self::DemoPlannerCritic
        )
    }

    /// Whether the evaluation stage may run in this mode. The demo presets
    /// and the retriever preset never evaluate, regardless of the toggle.
    fn eval_applicable(self) -> bool {
        matches!(
            self,
            Self::DevPlanner | Self::DevPlannerStylist | Self::DevPlannerCritic | Self::DevFull
        )
    }

    /// Modes where the evaluation toggle is overridden to off before the
    /// request leaves the studio.
    pub fn forces_eval_off(self) -> bool {
        matches!(self, Self::DemoFull | Self::DemoPlannerCritic | Self::DevRetriever)
    }
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named phases of a remote pipeline run, in canonical pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Accepted by the remote, waiting for a worker
    Queued,
    /// Worker is setting up the run
    Initializing,
    /// Agent weights/config being loaded
    LoadingAgents,
    /// Generic in-progress marker
    Processing,
    /// Retrieval agent running
    ProcessingRetriever,
    /// Planner agent running
    ProcessingPlanner,
    /// Stylist agent running
    ProcessingStylist,
    /// Visualizer agent running
    ProcessingVisualizer,
    /// Critic loop running
    ProcessingCritic,
    /// Evaluation pass running
    ProcessingEval,
    /// Outputs being persisted
    Saving,
    /// Run finished successfully
    Completed,
    /// Run finished with an error
    Failed,
}

impl Stage {
    /// Every stage in canonical pipeline order.
    pub const ALL: [Stage; 13] = [
        Stage::Queued,
        Stage::Initializing,
        Stage::LoadingAgents,
        Stage::Processing,
        Stage::ProcessingRetriever,
        Stage::ProcessingPlanner,
        Stage::ProcessingStylist,
        Stage::ProcessingVisualizer,
        Stage::ProcessingCritic,
        Stage::ProcessingEval,
        Stage::Saving,
        Stage::Completed,
        Stage::Failed,
    ];

    /// Wire identifier for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::LoadingAgents => "loading_agents",
            Self::Processing => "processing",
            Self::ProcessingRetriever => "processing_retriever",
            Self::ProcessingPlanner => "processing_planner",
            Self::ProcessingStylist => "processing_stylist",
            Self::ProcessingVisualizer => "processing_visualizer",
            Self::ProcessingCritic => "processing_critic",
            Self::ProcessingEval => "processing_eval",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a wire identifier. Returns `None` for unknown strings, which
    /// callers must treat as a generic in-progress position.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value.trim())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Largest critic round count a request may carry.
pub const MAX_CRITIC_ROUNDS: u8 = 10;

/// Clamp a user-supplied critic round count into `[0, 10]`.
pub fn clamp_critic_rounds(rounds: i64) -> u8 {
    rounds.clamp(0, MAX_CRITIC_ROUNDS as i64) as u8
}

/// Critic rounds that will actually run: the clamped count when the critic
/// is enabled and the mode supports it, zero otherwise.
pub fn effective_critic_rounds(mode: ExecMode, critic_enabled: bool, rounds: i64) -> u8 {
    if critic_enabled && mode.critic_capable() {
        clamp_critic_rounds(rounds)
    } else {
        0
    }
}

/// Derive the ordered stage list a run with these options is expected to
/// pass through.
///
/// The list always starts with `queued` and ends with `completed`, contains
/// each stage at most once (first occurrence wins), and never includes the
/// `failed` stage: failure is a status, not a planned phase. The retrieval
/// setting travels with the request but does not alter the plan; the full
/// modes always schedule the retriever.
pub fn plan(
    mode: ExecMode,
    _retrieval_setting: Option<&str>,
    critic_enabled: bool,
    critic_rounds: i64,
    eval_enabled: bool,
) -> Vec<Stage> {
    let critic_rounds = effective_critic_rounds(mode, critic_enabled, critic_rounds);
    let mut stages = vec![
        Stage::Queued,
        Stage::Initializing,
        Stage::LoadingAgents,
        Stage::Processing,
    ];
    let mut push = |list: &mut Vec<Stage>, stage: Stage| {
        if !list.contains(&stage) {
            list.push(stage);
        }
    };

    match mode {
        ExecMode::Vanilla => {
            push(&mut stages, Stage::ProcessingVisualizer);
        }
        ExecMode::DevPlanner => {
            push(&mut stages, Stage::ProcessingPlanner);
            push(&mut stages, Stage::ProcessingVisualizer);
        }
        ExecMode::DevPlannerStylist => {
            push(&mut stages, Stage::ProcessingPlanner);
            push(&mut stages, Stage::ProcessingStylist);
            push(&mut stages, Stage::ProcessingVisualizer);
        }
        ExecMode::DevPlannerCritic | ExecMode::DemoPlannerCritic => {
            push(&mut stages, Stage::ProcessingPlanner);
            push(&mut stages, Stage::ProcessingVisualizer);
            if critic_enabled && critic_rounds > 0 {
                push(&mut stages, Stage::ProcessingCritic);
            }
        }
        ExecMode::DevFull | ExecMode::DemoFull | ExecMode::DevRetriever => {
            push(&mut stages, Stage::ProcessingRetriever);
            push(&mut stages, Stage::ProcessingPlanner);
            push(&mut stages, Stage::ProcessingStylist);
            push(&mut stages, Stage::ProcessingVisualizer);
            if critic_enabled && critic_rounds > 0 {
                push(&mut stages, Stage::ProcessingCritic);
            }
        }
    }

    if eval_enabled && mode.eval_applicable() {
        push(&mut stages, Stage::ProcessingEval);
    }
    push(&mut stages, Stage::Saving);
    push(&mut stages, Stage::Completed);

    stages
}
