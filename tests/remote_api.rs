//! Remote draw-API contract tests.
//!
//! Exercise the HTTP client against a mock remote: request shape, envelope
//! decoding, error mapping, and the controller driving a full task
//! lifecycle over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use banana_studio::config::{RemoteConfig, UploadLimits};
use banana_studio::error::GenerationError;
use banana_studio::generation::{
    GenerationController, GenerationRequest, HttpJobClient, JobClient, RemoteStatus,
    RequestDefaults, SubmitOptions, TaskPhase, TaskSnapshot,
};
use banana_studio::keystore::crypto::SecretCipher;
use banana_studio::keystore::{ActiveKey, Keystore};
use banana_studio::providers::ProviderCatalog;

fn remote_config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        api_host: server.uri(),
        poll_interval_secs: 0,
        ..RemoteConfig::default()
    }
}

fn active_key(server: &MockServer) -> ActiveKey {
    ActiveKey {
        provider: "grsai".to_string(),
        secret: "sk-live-grsai-0001".to_string(),
        base_url: format!("{}/v1", server.uri()),
    }
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::build(
        SubmitOptions {
            prompt: prompt.to_string(),
            ..SubmitOptions::default()
        },
        RequestDefaults::default(),
        &ProviderCatalog::load(None),
        &UploadLimits::default(),
    )
    .expect("request resolves")
}

fn seeded_keystore(dir: &std::path::Path, server: &MockServer) -> Arc<Keystore> {
    let store = Keystore::open(dir, SecretCipher::from_passphrase(None), server.uri())
        .expect("open keystore");
    store
        .add_key("grsai", "sk-live-grsai-0001", "", "")
        .expect("seed key");
    Arc::new(store)
}

async fn wait_for_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<TaskSnapshot>,
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
async fn submit_posts_the_resolved_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .and(header("Authorization", "Bearer sk-live-grsai-0001"))
        .and(body_partial_json(json!({
            "model": "nano-banana-pro",
            "provider": "grsai",
            "textProvider": "grsai",
            "imageProvider": "grsai",
            "textModel": "gemini-2.5-pro",
            "imageModel": "nano-banana-pro",
            "expMode": "dev_full",
            "retrievalSetting": "none",
            "criticEnabled": true,
            "evalEnabled": true,
            "maxCriticRounds": 3,
            "prompt": "a circuit diagram",
            "aspectRatio": "16:9",
            "imageSize": "1K",
            "shutProgress": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"id": "task-100"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let id = client
        .submit(&request("a circuit diagram"), &active_key(&server))
        .await
        .expect("submit accepted");
    assert_eq!(id, "task-100");
}

#[tokio::test]
async fn submit_rejection_carries_the_remote_reason() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 7,
            "msg": "quota exceeded"
        })))
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let err = client
        .submit(&request("a circuit diagram"), &active_key(&server))
        .await
        .expect_err("submission refused");
    match err {
        GenerationError::Submission(msg) => assert_eq!(msg, "quota exceeded"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn submit_http_failure_is_a_submission_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let err = client
        .submit(&request("a circuit diagram"), &active_key(&server))
        .await
        .expect_err("gateway down");
    match err {
        GenerationError::Submission(msg) => assert!(msg.contains("503"), "got: {msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn submit_without_an_id_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {}
        })))
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let err = client
        .submit(&request("a circuit diagram"), &active_key(&server))
        .await
        .expect_err("no id in response");
    assert!(matches!(err, GenerationError::Submission(_)));
}

#[tokio::test]
async fn poll_maps_the_full_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .and(body_partial_json(json!({"id": "task-100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "status": "running",
                "stage": "processing_planner",
                "stageMessage": "Planning figure",
                "progress": 52.4,
                "results": []
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let snapshot = client
        .poll("task-100", &active_key(&server))
        .await
        .expect("poll");
    assert_eq!(snapshot.status, Some(RemoteStatus::Running));
    assert_eq!(snapshot.stage.as_deref(), Some("processing_planner"));
    assert_eq!(snapshot.stage_message.as_deref(), Some("Planning figure"));
    assert_eq!(snapshot.progress, Some(52));
    assert!(snapshot.results.is_empty());
    assert!(snapshot.failure_reason.is_none());
}

#[tokio::test]
async fn poll_failure_reason_falls_back_to_the_error_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"status": "failed", "error": "worker crashed"}
        })))
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let snapshot = client
        .poll("task-3", &active_key(&server))
        .await
        .expect("poll");
    assert_eq!(snapshot.status, Some(RemoteStatus::Failed));
    assert_eq!(snapshot.failure_reason.as_deref(), Some("worker crashed"));
}

#[tokio::test]
async fn poll_nonzero_code_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 500,
            "msg": "result not ready"
        })))
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    let err = client
        .poll("task-3", &active_key(&server))
        .await
        .expect_err("not ready");
    match err {
        GenerationError::TransientPoll(msg) => assert_eq!(msg, "result not ready"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancel_posts_the_task_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/cancel"))
        .and(body_partial_json(json!({"id": "task-9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"id": "task-9", "cancelled": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpJobClient::new(remote_config(&server)).expect("client");
    client
        .cancel("task-9", &active_key(&server))
        .await
        .expect("cancel delivered");
}

#[tokio::test]
async fn controller_drives_a_task_to_success_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"id": "task-55"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    // First poll reports progress, every later one reports completion.
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "status": "running",
                "stage": "processing",
                "stageMessage": "Running inference",
                "progress": 45
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "status": "succeeded",
                "stage": "completed",
                "progress": 100,
                "results": [{"url": "https://cdn.example/out.png", "content": "generated"}]
            }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = remote_config(&server);
    let client = Arc::new(HttpJobClient::new(config.clone()).expect("client"));
    let controller =
        GenerationController::new(client, seeded_keystore(dir.path(), &server), &config);
    let mut rx = controller.subscribe();

    let task_id = controller
        .submit(request("a circuit diagram"))
        .await
        .expect("submit");
    assert_eq!(task_id, "task-55");

    let terminal = wait_for_terminal(&mut rx).await;
    assert_eq!(terminal.phase, TaskPhase::Succeeded);
    assert_eq!(terminal.attempts, 2);
    assert_eq!(terminal.results.len(), 1);
    assert_eq!(terminal.results[0].url, "https://cdn.example/out.png");
}

#[tokio::test]
async fn controller_cancel_reaches_the_remote() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"id": "task-77"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"status": "running", "stage": "processing"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/cancel"))
        .and(body_partial_json(json!({"id": "task-77"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"id": "task-77", "cancelled": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    // A long interval parks the poll loop so cancellation is what wakes it.
    let config = RemoteConfig {
        api_host: server.uri(),
        poll_interval_secs: 60,
        ..RemoteConfig::default()
    };
    let client = Arc::new(HttpJobClient::new(config.clone()).expect("client"));
    let controller =
        GenerationController::new(client, seeded_keystore(dir.path(), &server), &config);

    controller
        .submit(request("a circuit diagram"))
        .await
        .expect("submit");
    let snapshot = controller.cancel().await.expect("task existed");
    assert_eq!(snapshot.phase, TaskPhase::Cancelled);

    // Give the detached cancel call time to reach the mock before the
    // server verifies expectations on drop.
    tokio::time::sleep(Duration::from_millis(200)).await;
}
