//! Remote draw-API client.
//!
//! The remote pipeline exposes three endpoints: submit, result poll and
//! cancel. Every response is wrapped in a `{code, msg, data}` envelope where
//! a zero code means success. Submission failures are fatal; poll failures
//! are transient because the remote answers non-zero while a task is not
//! ready yet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::GenerationError;
use crate::keystore::ActiveKey;
use crate::providers;

use super::request::GenerationRequest;

/// Lifecycle states the remote reports for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RemoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Map a raw status string. Anything unrecognized counts as still
    /// running so that drift in the remote vocabulary never wedges a poll
    /// loop into a terminal state it did not earn.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" | "" => Self::Queued,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "running" => Self::Running,
            other => {
                tracing::debug!("unrecognized remote status {:?}, treating as running", other);
                Self::Running
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated artifact from a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Everything one poll round-trip told us about the task.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub status: Option<RemoteStatus>,
    pub stage: Option<String>,
    pub stage_message: Option<String>,
    pub progress: Option<u8>,
    pub results: Vec<ResultItem>,
    pub failure_reason: Option<String>,
}

impl PollSnapshot {
    /// Snapshot for a terminal status, mainly for tests and scripted polls.
    pub fn with_status(status: RemoteStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Boundary to the remote pipeline. The controller drives every call; the
/// client keeps no task state between calls.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit a generation request, returning the remote task id.
    async fn submit(
        &self,
        request: &GenerationRequest,
        key: &ActiveKey,
    ) -> Result<String, GenerationError>;

    /// Poll the task once. Errors are transient; the caller decides when to
    /// stop retrying.
    async fn poll(&self, task_id: &str, key: &ActiveKey) -> Result<PollSnapshot, GenerationError>;

    /// Ask the remote to abandon the task. Best effort.
    async fn cancel(&self, task_id: &str, key: &ActiveKey) -> Result<(), GenerationError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default, alias = "stage_message")]
    stage_message: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    results: Option<Vec<ResultItem>>,
    // The remote reports failures under either key depending on version.
    #[serde(default, rename = "failure_reason")]
    failure_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    model: &'a str,
    provider: &'a str,
    text_provider: &'a str,
    image_provider: &'a str,
    text_model: &'a str,
    image_model: &'a str,
    exp_mode: &'a str,
    retrieval_setting: &'a str,
    critic_enabled: bool,
    eval_enabled: bool,
    max_critic_rounds: u8,
    prompt: &'a str,
    aspect_ratio: &'a str,
    image_size: &'a str,
    urls: Vec<&'a str>,
    shut_progress: bool,
}

impl<'a> SubmitBody<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            model: &request.preset,
            provider: &request.provider,
            text_provider: &request.text_provider,
            image_provider: &request.image_provider,
            text_model: &request.text_model,
            image_model: &request.image_model,
            exp_mode: request.exp_mode.as_str(),
            retrieval_setting: &request.retrieval_setting,
            critic_enabled: request.critic_enabled,
            eval_enabled: request.eval_enabled,
            max_critic_rounds: request.max_critic_rounds,
            prompt: &request.prompt,
            aspect_ratio: &request.aspect_ratio,
            image_size: &request.image_size,
            urls: request
                .reference_images
                .iter()
                .map(|image| image.data_url.as_str())
                .collect(),
            shut_progress: request.shut_progress,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskRef<'a> {
    id: &'a str,
}

/// `JobClient` over HTTP with reqwest.
pub struct HttpJobClient {
    http: reqwest::Client,
    remote: RemoteConfig,
}

impl HttpJobClient {
    pub fn new(remote: RemoteConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(remote.request_timeout_secs))
            .build()?;
        Ok(Self { http, remote })
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        key: &ActiveKey,
        body: &B,
    ) -> Result<Envelope<T>, String> {
        let mut request = self.http.post(url).json(body);
        for (name, value) in providers::auth_headers(&key.provider, &key.secret) {
            request = request.header(name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("remote returned HTTP {}", status));
        }
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| format!("invalid response body: {}", e))
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn submit(
        &self,
        request: &GenerationRequest,
        key: &ActiveKey,
    ) -> Result<String, GenerationError> {
        let body = SubmitBody::from_request(request);
        let envelope: Envelope<SubmitData> = self
            .post_json(&self.remote.draw_url(), key, &body)
            .await
            .map_err(GenerationError::Submission)?;
        if envelope.code != 0 {
            let reason = envelope
                .msg
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("remote rejected submission with code {}", envelope.code));
            return Err(GenerationError::Submission(reason));
        }
        let id = envelope.data.map(|d| d.id).unwrap_or_default();
        if id.trim().is_empty() {
            return Err(GenerationError::Submission(
                "remote accepted the submission but returned no task id".into(),
            ));
        }
        tracing::debug!(task_id = %id, "submitted generation task");
        Ok(id)
    }

    async fn poll(&self, task_id: &str, key: &ActiveKey) -> Result<PollSnapshot, GenerationError> {
        let envelope: Envelope<PollData> = self
            .post_json(&self.remote.result_url(), key, &TaskRef { id: task_id })
            .await
            .map_err(GenerationError::TransientPoll)?;
        if envelope.code != 0 {
            let reason = envelope
                .msg
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("remote answered code {}", envelope.code));
            return Err(GenerationError::TransientPoll(reason));
        }
        let data = envelope.data.unwrap_or_default();
        Ok(PollSnapshot {
            status: Some(RemoteStatus::parse_lenient(&data.status)),
            stage: data.stage.filter(|s| !s.trim().is_empty()),
            stage_message: data.stage_message.filter(|s| !s.trim().is_empty()),
            progress: data.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            results: data.results.unwrap_or_default(),
            failure_reason: data
                .failure_reason
                .or(data.error)
                .filter(|s| !s.trim().is_empty()),
        })
    }

    async fn cancel(&self, task_id: &str, key: &ActiveKey) -> Result<(), GenerationError> {
        let envelope: Envelope<serde_json::Value> = self
            .post_json(&self.remote.cancel_url(), key, &TaskRef { id: task_id })
            .await
            .map_err(GenerationError::TransientPoll)?;
        if envelope.code != 0 {
            return Err(GenerationError::TransientPoll(format!(
                "remote refused the cancel with code {}",
                envelope.code
            )));
        }
        Ok(())
    }
}
