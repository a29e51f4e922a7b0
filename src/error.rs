//! Error types for the generation lifecycle.

/// Errors produced while driving a generation task.
///
/// The variants map onto distinct user-visible outcomes: validation and
/// concurrency problems are reported before any network call, submission
/// rejections are fatal for the attempt, transient poll failures are
/// swallowed by the polling loop, and a timeout is deliberately not a
/// failure (the remote job is presumed still running).
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Request rejected before any network call (empty prompt, missing
    /// credential, oversized reference image).
    #[error("{0}")]
    Validation(String),

    /// The remote rejected the submission. Not retried automatically.
    #[error("submission rejected: {0}")]
    Submission(String),

    /// Network-level failure during polling. The loop continues on the
    /// next interval.
    #[error("poll attempt failed: {0}")]
    TransientPoll(String),

    /// The remote reported the task as failed.
    #[error("remote task failed: {0}")]
    RemoteFailure(String),

    /// A task is already submitting or polling on this controller.
    #[error("a generation task is already in flight")]
    ConcurrentTask,

    /// The poll ceiling was reached without a terminal status. The remote
    /// job may still be running; the id is kept for a later manual check.
    #[error("no terminal status after {attempts} polls; task {task_id} may still be running")]
    PollTimeout { task_id: String, attempts: u32 },

    /// The credential store could not be read at submit time.
    #[error("credential store error: {0}")]
    Keystore(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GenerationError>;
