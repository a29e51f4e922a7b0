//! Generation task controller.
//!
//! Owns the single task slot: submission, the background poll loop,
//! cancellation and the broadcast of snapshot updates. All lifecycle
//! decisions live in [`TaskState`]; this module supplies the I/O around
//! it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::GenerationError;
use crate::keystore::{ActiveKey, Keystore};
use crate::workflow;

use super::client::JobClient;
use super::request::GenerationRequest;
use super::task::{Effect, TaskEvent, TaskPhase, TaskSnapshot, TaskState};

/// Sleep abstraction so tests can drive the poll loop without waiting out
/// real intervals.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct ControllerInner {
    state: TaskState,
    cancel_token: Option<CancellationToken>,
    /// Bumped each time a submission takes the slot. A poll loop carries
    /// the value it was spawned under and stands down once it changes.
    run: u64,
    /// Credential pinned at submit time, reused for polls and the cancel.
    key: Option<ActiveKey>,
    /// When set, published snapshots omit the percentage.
    shut_progress: bool,
}

/// Drives one generation task at a time against the remote pipeline.
pub struct GenerationController {
    client: Arc<dyn JobClient>,
    keystore: Arc<Keystore>,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
    inner: Arc<Mutex<ControllerInner>>,
    events_tx: broadcast::Sender<TaskSnapshot>,
}

impl GenerationController {
    pub fn new(client: Arc<dyn JobClient>, keystore: Arc<Keystore>, remote: &RemoteConfig) -> Self {
        Self::with_sleeper(client, keystore, remote, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        client: Arc<dyn JobClient>,
        keystore: Arc<Keystore>,
        remote: &RemoteConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            client,
            keystore,
            sleeper,
            poll_interval: Duration::from_secs(remote.poll_interval_secs),
            inner: Arc::new(Mutex::new(ControllerInner {
                state: TaskState::new(remote.poll_max_attempts),
                cancel_token: None,
                run: 0,
                key: None,
                shut_progress: false,
            })),
            events_tx,
        }
    }

    /// Subscribe to snapshot updates for the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskSnapshot> {
        self.events_tx.subscribe()
    }

    /// Current view of the tracked task.
    pub async fn snapshot(&self) -> TaskSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    /// Snapshot as the event stream publishes it, with the percentage
    /// withheld while progress suppression is on.
    pub async fn published_snapshot(&self) -> TaskSnapshot {
        let inner = self.inner.lock().await;
        let mut snapshot = inner.state.snapshot();
        if inner.shut_progress {
            snapshot.progress = None;
        }
        snapshot
    }

    /// Submit a validated request and start the poll loop.
    ///
    /// Fails with `ConcurrentTask` while a task is active, with a
    /// validation error when no credential is active for the image
    /// provider, and with a submission error when the remote refuses the
    /// task. Every failure leaves the slot free for another attempt.
    pub async fn submit(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let key = self
            .keystore
            .active_key(&request.image_provider)
            .map_err(|e| GenerationError::Keystore(e.to_string()))?
            .ok_or_else(|| {
                GenerationError::Validation(format!(
                    "no active credential for provider {}",
                    request.image_provider
                ))
            })?;

        let plan = workflow::plan(
            request.exp_mode,
            Some(&request.retrieval_setting),
            request.critic_enabled,
            request.max_critic_rounds as i64,
            request.eval_enabled,
        );

        {
            let mut inner = self.inner.lock().await;
            if inner.state.phase().is_active() {
                return Err(GenerationError::ConcurrentTask);
            }
            let effects = inner.state.step(TaskEvent::SubmitRequested { plan });
            inner.run += 1;
            inner.key = Some(key.clone());
            inner.shut_progress = request.shut_progress;
            self.apply_effects(&mut inner, effects);
        }

        let submitted = self.client.submit(&request, &key).await;

        let mut inner = self.inner.lock().await;
        match submitted {
            Ok(task_id) => {
                let effects = inner.state.step(TaskEvent::SubmitSucceeded {
                    task_id: task_id.clone(),
                });
                self.apply_effects(&mut inner, effects);
                if inner.state.phase() == TaskPhase::Polling {
                    let token = CancellationToken::new();
                    inner.cancel_token = Some(token.clone());
                    self.spawn_poll_loop(key, token, inner.run);
                }
                Ok(task_id)
            }
            Err(error) => {
                let reason = match &error {
                    GenerationError::Submission(msg) => msg.clone(),
                    other => other.to_string(),
                };
                let effects = inner.state.step(TaskEvent::SubmitFailed { reason });
                self.apply_effects(&mut inner, effects);
                Err(error)
            }
        }
    }

    /// Request cancellation of the tracked task.
    ///
    /// Returns `None` when nothing was ever submitted. Cancelling a
    /// terminal task is a no-op that reports the final snapshot.
    pub async fn cancel(&self) -> Option<TaskSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.state.phase() == TaskPhase::Idle {
            return None;
        }
        let effects = inner.state.step(TaskEvent::CancelRequested);
        self.apply_effects(&mut inner, effects);
        if let Some(token) = &inner.cancel_token {
            token.cancel();
        }
        Some(inner.state.snapshot())
    }

    fn apply_effects(&self, inner: &mut ControllerInner, effects: Vec<Effect>) -> bool {
        apply_effects(&self.client, &self.events_tx, inner, effects)
    }

    fn spawn_poll_loop(&self, key: ActiveKey, token: CancellationToken, run: u64) {
        let client = Arc::clone(&self.client);
        let sleeper = Arc::clone(&self.sleeper);
        let inner = Arc::clone(&self.inner);
        let events_tx = self.events_tx.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            poll_loop(client, events_tx, inner, key, token, sleeper, interval, run).await;
        });
    }
}

/// Execute machine effects. Returns whether a poll round was requested.
fn apply_effects(
    client: &Arc<dyn JobClient>,
    events_tx: &broadcast::Sender<TaskSnapshot>,
    inner: &mut ControllerInner,
    effects: Vec<Effect>,
) -> bool {
    let mut poll_requested = false;
    for effect in effects {
        match effect {
            Effect::Poll => poll_requested = true,
            Effect::Publish => {
                let mut snapshot = inner.state.snapshot();
                if inner.shut_progress {
                    snapshot.progress = None;
                }
                let _ = events_tx.send(snapshot);
            }
            Effect::UnknownStage(stage) => {
                warn!(
                    stage = %stage,
                    task_id = inner.state.task_id().unwrap_or("-"),
                    "remote reported a stage outside the planned pipeline"
                );
            }
            Effect::CancelRemote => {
                let Some(task_id) = inner.state.task_id().map(str::to_string) else {
                    continue;
                };
                let Some(key) = inner.key.clone() else {
                    continue;
                };
                let client = Arc::clone(client);
                tokio::spawn(async move {
                    match client.cancel(&task_id, &key).await {
                        Ok(()) => debug!(task_id = %task_id, "remote cancel delivered"),
                        Err(e) => warn!(task_id = %task_id, "remote cancel failed: {}", e),
                    }
                });
            }
        }
    }
    poll_requested
}

/// Poll until the task reaches a terminal phase, the attempt ceiling is
/// hit, or a cancellation is observed. Runs detached from the controller
/// and steps the machine only while its run still owns the slot, so a
/// loop waking late cannot touch a task submitted after it.
#[allow(clippy::too_many_arguments)]
async fn poll_loop(
    client: Arc<dyn JobClient>,
    events_tx: broadcast::Sender<TaskSnapshot>,
    inner: Arc<Mutex<ControllerInner>>,
    key: ActiveKey,
    token: CancellationToken,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    run: u64,
) {
    loop {
        tokio::select! {
            // The cancel path already stepped the machine and published.
            _ = token.cancelled() => break,
            _ = sleeper.sleep(interval) => {}
        }

        let (poll_now, task_id) = {
            let mut guard = inner.lock().await;
            if guard.run != run {
                break;
            }
            let effects = guard.state.step(TaskEvent::PollDue);
            let poll_now = apply_effects(&client, &events_tx, &mut guard, effects);
            if guard.state.phase() == TaskPhase::TimedOut {
                let error = GenerationError::PollTimeout {
                    task_id: guard.state.task_id().unwrap_or("-").to_string(),
                    attempts: guard.state.snapshot().attempts,
                };
                warn!("giving up on the remote task: {}", error);
            }
            (poll_now, guard.state.task_id().map(str::to_string))
        };
        if !poll_now {
            // Timed out, or a cancellation won the race.
            break;
        }
        let Some(task_id) = task_id else {
            break;
        };

        match client.poll(&task_id, &key).await {
            Ok(snapshot) => {
                let mut guard = inner.lock().await;
                if guard.run != run {
                    break;
                }
                let effects = guard.state.step(TaskEvent::PollCompleted(snapshot));
                apply_effects(&client, &events_tx, &mut guard, effects);
                if guard.state.phase().is_terminal() {
                    break;
                }
            }
            Err(error) => {
                warn!(task_id = %task_id, "poll attempt failed: {}", error);
                let mut guard = inner.lock().await;
                if guard.run != run {
                    break;
                }
                let effects = guard.state.step(TaskEvent::PollFailed {
                    reason: error.to_string(),
                });
                apply_effects(&client, &events_tx, &mut guard, effects);
                if guard.state.phase().is_terminal() {
                    break;
                }
            }
        }
    }
    debug!("poll loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadLimits;
    use crate::generation::client::{PollSnapshot, RemoteStatus, ResultItem};
    use crate::generation::request::{RequestDefaults, SubmitOptions};
    use crate::keystore::crypto::SecretCipher;
    use crate::providers::ProviderCatalog;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct ScriptedClient {
        submits: std::sync::Mutex<VecDeque<Result<String, GenerationError>>>,
        polls: std::sync::Mutex<VecDeque<Result<PollSnapshot, GenerationError>>>,
        submit_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(
            submits: Vec<Result<String, GenerationError>>,
            polls: Vec<Result<PollSnapshot, GenerationError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                submits: std::sync::Mutex::new(submits.into()),
                polls: std::sync::Mutex::new(polls.into()),
                submit_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobClient for ScriptedClient {
        async fn submit(
            &self,
            _request: &GenerationRequest,
            _key: &ActiveKey,
        ) -> Result<String, GenerationError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.submits
                .lock()
                .expect("submit script")
                .pop_front()
                .unwrap_or(Ok("scripted-task".into()))
        }

        async fn poll(
            &self,
            _task_id: &str,
            _key: &ActiveKey,
        ) -> Result<PollSnapshot, GenerationError> {
            self.polls
                .lock()
                .expect("poll script")
                .pop_front()
                .unwrap_or_else(|| Ok(PollSnapshot::with_status(RemoteStatus::Running)))
        }

        async fn cancel(&self, _task_id: &str, _key: &ActiveKey) -> Result<(), GenerationError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sleeps never complete; the loop only moves on cancellation.
    struct PendingSleeper;

    #[async_trait]
    impl Sleeper for PendingSleeper {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps complete immediately after yielding to the scheduler.
    struct InstantSleeper;

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }
    }

    /// Parks the first task's poll on a gate until the test releases it,
    /// then answers with a late success for that task. Polls for any
    /// later task never return.
    struct GatedClient {
        submit_calls: AtomicUsize,
        reached_gate: Notify,
        gate: Notify,
        cancel_calls: AtomicUsize,
    }

    impl GatedClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                submit_calls: AtomicUsize::new(0),
                reached_gate: Notify::new(),
                gate: Notify::new(),
                cancel_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobClient for GatedClient {
        async fn submit(
            &self,
            _request: &GenerationRequest,
            _key: &ActiveKey,
        ) -> Result<String, GenerationError> {
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("task-{}", n))
        }

        async fn poll(
            &self,
            task_id: &str,
            _key: &ActiveKey,
        ) -> Result<PollSnapshot, GenerationError> {
            if task_id == "task-0" {
                self.reached_gate.notify_one();
                self.gate.notified().await;
                return Ok(PollSnapshot {
                    status: Some(RemoteStatus::Succeeded),
                    results: vec![ResultItem {
                        url: "https://cdn.example/stale.png".into(),
                        content: None,
                    }],
                    ..PollSnapshot::default()
                });
            }
            std::future::pending().await
        }

        async fn cancel(&self, _task_id: &str, _key: &ActiveKey) -> Result<(), GenerationError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_keystore() -> Arc<Keystore> {
        let store = Keystore::open_in_memory(SecretCipher::from_passphrase(None), "https://grsai.test")
            .expect("keystore");
        store
            .add_key("grsai", "sk-test-0123456789", "", "")
            .expect("seed key");
        Arc::new(store)
    }

    fn remote_config(max_attempts: u32) -> RemoteConfig {
        RemoteConfig {
            poll_interval_secs: 0,
            poll_max_attempts: max_attempts,
            ..RemoteConfig::default()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::build(
            SubmitOptions {
                prompt: "pipeline overview figure".into(),
                ..SubmitOptions::default()
            },
            RequestDefaults::default(),
            &ProviderCatalog::load(None),
            &UploadLimits::default(),
        )
        .expect("request")
    }

    async fn wait_for_terminal(
        rx: &mut broadcast::Receiver<TaskSnapshot>,
    ) -> TaskSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = rx.recv().await.expect("event stream open");
                if snapshot.phase.is_terminal() {
                    return snapshot;
                }
            }
        })
        .await
        .expect("terminal snapshot before timeout")
    }

    #[tokio::test]
    async fn submit_polls_to_success_and_keeps_results() {
        let client = ScriptedClient::new(
            vec![Ok("task-77".into())],
            vec![
                Ok(PollSnapshot {
                    status: Some(RemoteStatus::Running),
                    stage: Some("processing".into()),
                    progress: Some(45),
                    ..PollSnapshot::default()
                }),
                Ok(PollSnapshot {
                    status: Some(RemoteStatus::Succeeded),
                    results: vec![ResultItem {
                        url: "https://cdn.example/out.png".into(),
                        content: None,
                    }],
                    ..PollSnapshot::default()
                }),
            ],
        );
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(InstantSleeper),
        );
        let mut rx = controller.subscribe();

        let task_id = controller.submit(request()).await.expect("submit");
        assert_eq!(task_id, "task-77");

        let terminal = wait_for_terminal(&mut rx).await;
        assert_eq!(terminal.phase, TaskPhase::Succeeded);
        assert_eq!(terminal.results.len(), 1);
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 0);

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.task_id.as_deref(), Some("task-77"));
        assert_eq!(snapshot.status, RemoteStatus::Succeeded);
    }

    #[tokio::test]
    async fn second_submit_while_active_is_rejected() {
        let client = ScriptedClient::new(vec![Ok("task-1".into())], Vec::new());
        let controller = GenerationController::with_sleeper(
            client,
            test_keystore(),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );

        controller.submit(request()).await.expect("first submit");
        let err = controller.submit(request()).await.expect_err("second submit");
        assert!(matches!(err, GenerationError::ConcurrentTask));

        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn rejected_submission_surfaces_and_frees_the_slot() {
        let client = ScriptedClient::new(
            vec![
                Err(GenerationError::Submission("quota exhausted".into())),
                Ok("task-2".into()),
            ],
            Vec::new(),
        );
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );

        let err = controller.submit(request()).await.expect_err("rejected");
        assert!(matches!(err, GenerationError::Submission(_)));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, TaskPhase::Failed);
        assert_eq!(snapshot.failure_reason.as_deref(), Some("quota exhausted"));

        // The slot is immediately usable again.
        let task_id = controller.submit(request()).await.expect("second attempt");
        assert_eq!(task_id, "task-2");
        assert_eq!(client.submit_calls.load(Ordering::SeqCst), 2);
        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn missing_credential_fails_validation_without_a_network_call() {
        let client = ScriptedClient::new(Vec::new(), Vec::new());
        let store = Keystore::open_in_memory(
            SecretCipher::from_passphrase(None),
            "https://grsai.test",
        )
        .expect("keystore");
        let controller = GenerationController::with_sleeper(
            client.clone(),
            Arc::new(store),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );

        let err = controller.submit(request()).await.expect_err("no credential");
        assert!(matches!(err, GenerationError::Validation(_)));
        assert_eq!(client.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.snapshot().await.phase, TaskPhase::Idle);
    }

    #[tokio::test]
    async fn remote_failure_keeps_the_reported_reason() {
        let client = ScriptedClient::new(
            vec![Ok("task-13".into())],
            vec![Ok(PollSnapshot {
                status: Some(RemoteStatus::Failed),
                failure_reason: Some("content policy rejection".into()),
                ..PollSnapshot::default()
            })],
        );
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(InstantSleeper),
        );
        let mut rx = controller.subscribe();

        controller.submit(request()).await.expect("submit");
        let terminal = wait_for_terminal(&mut rx).await;
        assert_eq!(terminal.phase, TaskPhase::Failed);
        assert_eq!(
            terminal.failure_reason.as_deref(),
            Some("content policy rejection")
        );
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 0);

        // A failed run frees the slot for the next submission.
        controller.submit(request()).await.expect("resubmit");
        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn poll_ceiling_reports_timeout_with_the_task_id() {
        let client = ScriptedClient::new(vec![Ok("task-42".into())], Vec::new());
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(3),
            Arc::new(InstantSleeper),
        );
        let mut rx = controller.subscribe();

        controller.submit(request()).await.expect("submit");
        let terminal = wait_for_terminal(&mut rx).await;
        assert_eq!(terminal.phase, TaskPhase::TimedOut);
        assert_eq!(terminal.task_id.as_deref(), Some("task-42"));
        assert_eq!(terminal.attempts, 3);
        // A timeout is not a cancellation.
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 0);

        // The slot accepts a fresh task afterwards.
        controller.submit(request()).await.expect("resubmit");
        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn cancel_before_any_poll_issues_exactly_one_remote_cancel() {
        let client = ScriptedClient::new(vec![Ok("task-9".into())], Vec::new());
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );

        controller.submit(request()).await.expect("submit");
        let snapshot = controller.cancel().await.expect("task existed");
        assert_eq!(snapshot.phase, TaskPhase::Cancelled);

        // Cancelling again changes nothing.
        let again = controller.cancel().await.expect("snapshot");
        assert_eq!(again.phase, TaskPhase::Cancelled);

        // Let the spawned cancel task run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 1);
        assert!(snapshot.failure_reason.is_none());
    }

    #[tokio::test]
    async fn cancel_with_no_task_returns_none() {
        let client = ScriptedClient::new(Vec::new(), Vec::new());
        let controller = GenerationController::with_sleeper(
            client,
            test_keystore(),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );
        assert!(controller.cancel().await.is_none());
    }

    #[tokio::test]
    async fn resubmit_after_cancel_leaves_the_new_task_polling() {
        let client = ScriptedClient::new(
            vec![Ok("task-a".into()), Ok("task-b".into())],
            Vec::new(),
        );
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(PendingSleeper),
        );

        controller.submit(request()).await.expect("first submit");
        let cancelled = controller.cancel().await.expect("task existed");
        assert_eq!(cancelled.phase, TaskPhase::Cancelled);

        let task_id = controller.submit(request()).await.expect("second submit");
        assert_eq!(task_id, "task-b");

        // Give the first task's parked loop time to observe its token.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, TaskPhase::Polling);
        assert_eq!(snapshot.task_id.as_deref(), Some("task-b"));
        // The only remote cancel belongs to the task that was cancelled.
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 1);

        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn stale_poll_response_cannot_finish_the_next_task() {
        let client = GatedClient::new();
        let controller = GenerationController::with_sleeper(
            client.clone(),
            test_keystore(),
            &remote_config(240),
            Arc::new(InstantSleeper),
        );

        controller.submit(request()).await.expect("first submit");
        tokio::time::timeout(Duration::from_secs(5), client.reached_gate.notified())
            .await
            .expect("first poll in flight");

        let cancelled = controller.cancel().await.expect("task existed");
        assert_eq!(cancelled.phase, TaskPhase::Cancelled);
        let task_id = controller.submit(request()).await.expect("second submit");
        assert_eq!(task_id, "task-1");

        // Release the parked poll; its late success belongs to the
        // cancelled task and must not leak into the new one.
        client.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, TaskPhase::Polling);
        assert_eq!(snapshot.task_id.as_deref(), Some("task-1"));
        assert!(snapshot.results.is_empty());
        assert_eq!(client.cancel_calls.load(Ordering::SeqCst), 1);

        controller.cancel().await.expect("task existed");
    }

    #[tokio::test]
    async fn shut_progress_strips_the_percentage_from_published_events() {
        let client = ScriptedClient::new(
            vec![Ok("task-5".into())],
            vec![Ok(PollSnapshot {
                status: Some(RemoteStatus::Succeeded),
                progress: Some(100),
                ..PollSnapshot::default()
            })],
        );
        let controller = GenerationController::with_sleeper(
            client,
            test_keystore(),
            &remote_config(240),
            Arc::new(InstantSleeper),
        );
        let mut rx = controller.subscribe();

        let mut options = SubmitOptions {
            prompt: "quiet run".into(),
            ..SubmitOptions::default()
        };
        options.shut_progress = Some(true);
        let request = GenerationRequest::build(
            options,
            RequestDefaults::default(),
            &ProviderCatalog::load(None),
            &UploadLimits::default(),
        )
        .expect("request");

        controller.submit(request).await.expect("submit");
        let terminal = wait_for_terminal(&mut rx).await;
        assert_eq!(terminal.phase, TaskPhase::Succeeded);
        assert_eq!(terminal.progress, None);

        // Internal tracking still carries the value.
        assert_eq!(controller.snapshot().await.progress, Some(100));
    }
}
