//! HTTP server assembly.
//!
//! Builds the shared application state from configuration, wires the
//! routes, and serves until the process is stopped.

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::types::HealthResponse;
use super::{generation, keys, providers};
use crate::config::Config;
use crate::generation::{GenerationController, HttpJobClient};
use crate::keystore::crypto::SecretCipher;
use crate::keystore::Keystore;
use crate::providers::ProviderCatalog;

/// Shared state carried by every handler.
pub struct AppState {
    pub config: Config,
    pub controller: GenerationController,
    pub keystore: Arc<Keystore>,
    pub catalog: ProviderCatalog,
}

/// Assemble the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/draw", post(generation::submit))
        .route("/api/result", post(generation::result))
        .route("/api/cancel", post(generation::cancel))
        .route("/api/plan", get(generation::plan))
        .route("/api/events", get(generation::events))
        .route("/api/keys", get(keys::list).post(keys::add))
        .route("/api/keys/active", post(keys::activate))
        .route("/api/keys/:id", delete(keys::remove))
        .route("/api/providers", get(providers::list_providers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the application state from configuration and serve the API.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let cipher = SecretCipher::from_passphrase(config.secret_key.as_deref());
    let keystore = Arc::new(
        Keystore::open(&config.data_dir, cipher, config.remote.api_host.clone())
            .context("open credential store")?,
    );
    let catalog = ProviderCatalog::load(config.providers_file.as_deref());
    let client =
        Arc::new(HttpJobClient::new(config.remote.clone()).context("build remote client")?);
    let controller = GenerationController::new(client, Arc::clone(&keystore), &config.remote);

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        controller,
        keystore,
        catalog,
        config,
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    tracing::info!("banana-studio listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
