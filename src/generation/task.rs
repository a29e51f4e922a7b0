//! Generation task lifecycle as a pure state machine.
//!
//! The controller owns one `TaskState` and feeds it events: submit
//! outcomes, poll results, the cancellation flag. Each event returns the
//! side effects the driver must perform. Keeping the transitions free of
//! I/O makes the timeout, cancellation and late-response rules directly
//! testable.

use std::collections::HashSet;

use serde::Serialize;

use crate::workflow::Stage;

use super::client::{PollSnapshot, RemoteStatus, ResultItem};

/// Progress shown right after submission so the display never sits at
/// zero while the remote is still queueing the task.
pub const SYNTHETIC_SUBMIT_PROGRESS: u8 = 10;

const FALLBACK_FAILURE_REASON: &str = "unknown error";

/// Lifecycle phase of the tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// No task tracked; submission is allowed
    Idle,
    /// Submit call in flight
    Submitting,
    /// Task accepted, poll loop running
    Polling,
    /// Terminal: remote reported success
    Succeeded,
    /// Terminal: submission or remote task failed
    Failed,
    /// Terminal: cancellation observed
    Cancelled,
    /// Terminal: poll ceiling reached without a terminal status
    TimedOut,
}

impl TaskPhase {
    /// Whether a task currently occupies the controller slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

/// Events the controller feeds into the machine.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A validated request is about to be submitted.
    SubmitRequested { plan: Vec<Stage> },
    SubmitSucceeded { task_id: String },
    SubmitFailed { reason: String },
    /// The poll interval elapsed without a cancellation.
    PollDue,
    PollCompleted(PollSnapshot),
    /// A poll attempt failed transiently; the attempt still counts.
    PollFailed { reason: String },
    /// The user asked to cancel.
    CancelRequested,
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Call the remote result endpoint once.
    Poll,
    /// Issue the single best-effort remote cancel.
    CancelRemote,
    /// Push the updated snapshot to observers.
    Publish,
    /// Log that the remote reported a stage outside the plan.
    UnknownStage(String),
}

/// Serializable view of the tracked task, consumed by the result endpoint,
/// the event stream and the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub phase: TaskPhase,
    pub task_id: Option<String>,
    pub status: RemoteStatus,
    pub stage: Option<String>,
    pub stage_message: Option<String>,
    pub progress: Option<u8>,
    pub results: Vec<ResultItem>,
    pub failure_reason: Option<String>,
    pub cancel_requested: bool,
    pub attempts: u32,
    pub plan: Vec<Stage>,
}

/// State machine for a single controller slot.
#[derive(Debug)]
pub struct TaskState {
    phase: TaskPhase,
    max_attempts: u32,
    attempts: u32,
    plan: Vec<Stage>,
    task_id: Option<String>,
    status: RemoteStatus,
    stage: Option<String>,
    stage_message: Option<String>,
    progress: Option<u8>,
    results: Vec<ResultItem>,
    failure_reason: Option<String>,
    cancel_requested: bool,
    cancel_sent: bool,
    warned_stages: HashSet<String>,
}

impl TaskState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            phase: TaskPhase::Idle,
            max_attempts,
            attempts: 0,
            plan: Vec::new(),
            task_id: None,
            status: RemoteStatus::Queued,
            stage: None,
            stage_message: None,
            progress: None,
            results: Vec::new(),
            failure_reason: None,
            cancel_requested: false,
            cancel_sent: false,
            warned_stages: HashSet::new(),
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            phase: self.phase,
            task_id: self.task_id.clone(),
            status: self.status,
            stage: self.stage.clone(),
            stage_message: self.stage_message.clone(),
            progress: self.progress,
            results: self.results.clone(),
            failure_reason: self.failure_reason.clone(),
            cancel_requested: self.cancel_requested,
            attempts: self.attempts,
            plan: self.plan.clone(),
        }
    }

    /// Return the slot to `Idle`, dropping the previous task's view. Has no
    /// effect while a task is active.
    pub fn reset(&mut self) -> bool {
        if self.phase.is_active() {
            return false;
        }
        let max_attempts = self.max_attempts;
        *self = Self::new(max_attempts);
        true
    }

    /// Apply one event, returning the effects the driver must perform.
    pub fn step(&mut self, event: TaskEvent) -> Vec<Effect> {
        match event {
            TaskEvent::SubmitRequested { plan } => self.on_submit_requested(plan),
            TaskEvent::SubmitSucceeded { task_id } => self.on_submit_succeeded(task_id),
            TaskEvent::SubmitFailed { reason } => self.on_submit_failed(reason),
            TaskEvent::PollDue => self.on_poll_due(),
            TaskEvent::PollCompleted(snapshot) => self.on_poll_completed(snapshot),
            TaskEvent::PollFailed { reason } => self.on_poll_failed(reason),
            TaskEvent::CancelRequested => self.on_cancel_requested(),
        }
    }

    fn on_submit_requested(&mut self, plan: Vec<Stage>) -> Vec<Effect> {
        if self.phase.is_active() {
            return Vec::new();
        }
        let max_attempts = self.max_attempts;
        *self = Self::new(max_attempts);
        self.phase = TaskPhase::Submitting;
        self.plan = plan;
        self.progress = Some(SYNTHETIC_SUBMIT_PROGRESS);
        vec![Effect::Publish]
    }

    fn on_submit_succeeded(&mut self, task_id: String) -> Vec<Effect> {
        if self.phase != TaskPhase::Submitting {
            return Vec::new();
        }
        self.task_id = Some(task_id);
        if self.cancel_requested {
            // The user cancelled while the submit call was in flight; the
            // remote id only just became known.
            return self.to_cancelled();
        }
        self.phase = TaskPhase::Polling;
        vec![Effect::Publish]
    }

    fn on_submit_failed(&mut self, reason: String) -> Vec<Effect> {
        if self.phase != TaskPhase::Submitting {
            return Vec::new();
        }
        self.phase = TaskPhase::Failed;
        self.status = RemoteStatus::Failed;
        self.failure_reason = Some(reason);
        vec![Effect::Publish]
    }

    fn on_poll_due(&mut self) -> Vec<Effect> {
        if self.phase != TaskPhase::Polling {
            return Vec::new();
        }
        if self.cancel_requested {
            return self.to_cancelled();
        }
        if self.attempts >= self.max_attempts {
            self.phase = TaskPhase::TimedOut;
            return vec![Effect::Publish];
        }
        self.attempts += 1;
        vec![Effect::Poll]
    }

    fn on_poll_completed(&mut self, snapshot: PollSnapshot) -> Vec<Effect> {
        if self.phase != TaskPhase::Polling {
            return Vec::new();
        }
        if self.cancel_requested {
            return self.to_cancelled();
        }

        let mut effects = Vec::new();
        if let Some(status) = snapshot.status {
            self.status = status;
        }
        if let Some(stage) = snapshot.stage {
            let known = Stage::parse(&stage)
                .map(|s| self.plan.contains(&s))
                .unwrap_or(false);
            if !known && self.warned_stages.insert(stage.clone()) {
                effects.push(Effect::UnknownStage(stage.clone()));
            }
            self.stage = Some(stage);
        }
        if snapshot.stage_message.is_some() {
            self.stage_message = snapshot.stage_message;
        }
        if snapshot.progress.is_some() {
            self.progress = snapshot.progress;
        }
        if !snapshot.results.is_empty() {
            self.results = snapshot.results;
        }
        if snapshot.failure_reason.is_some() {
            self.failure_reason = snapshot.failure_reason;
        }

        match self.status {
            RemoteStatus::Succeeded => {
                self.phase = TaskPhase::Succeeded;
            }
            RemoteStatus::Failed => {
                self.phase = TaskPhase::Failed;
                if self.failure_reason.is_none() {
                    self.failure_reason = Some(FALLBACK_FAILURE_REASON.to_string());
                }
            }
            RemoteStatus::Queued | RemoteStatus::Running => {}
        }
        effects.push(Effect::Publish);
        effects
    }

    fn on_poll_failed(&mut self, reason: String) -> Vec<Effect> {
        if self.phase != TaskPhase::Polling {
            return Vec::new();
        }
        if self.cancel_requested {
            return self.to_cancelled();
        }
        tracing::debug!(reason = %reason, attempt = self.attempts, "transient poll failure");
        Vec::new()
    }

    fn on_cancel_requested(&mut self) -> Vec<Effect> {
        match self.phase {
            TaskPhase::Submitting => {
                // No remote id yet. Remember the intent; the submit outcome
                // handler finishes the cancellation.
                self.cancel_requested = true;
                vec![Effect::Publish]
            }
            TaskPhase::Polling => {
                self.cancel_requested = true;
                self.to_cancelled()
            }
            _ => Vec::new(),
        }
    }

    fn to_cancelled(&mut self) -> Vec<Effect> {
        self.phase = TaskPhase::Cancelled;
        let mut effects = Vec::new();
        if !self.cancel_sent && self.task_id.is_some() {
            self.cancel_sent = true;
            effects.push(Effect::CancelRemote);
        }
        effects.push(Effect::Publish);
        effects
    }
}
