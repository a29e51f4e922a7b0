//! Credential-management endpoints.
//!
//! CRUD over the encrypted keystore. Every mutation responds with the
//! refreshed listing so the key-management panel can re-render without a
//! second round trip.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::routes::AppState;
use super::types::ApiError;
use crate::keystore::KeyListing;

/// Body for adding a key.
#[derive(Debug, Clone, Deserialize)]
pub struct AddKeyBody {
    /// Provider the key belongs to; empty selects the default draw host
    #[serde(default)]
    pub provider: String,

    /// Plaintext secret
    #[serde(default)]
    pub value: String,

    /// Optional display label
    #[serde(default)]
    pub name: String,

    /// Optional base URL override
    #[serde(default, alias = "baseUrl")]
    pub base_url: String,
}

/// Body for selecting the active key.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivateBody {
    pub id: Uuid,
}

/// List stored keys with their masks and per-provider active selection.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<KeyListing>, ApiError> {
    Ok(Json(state.keystore.list()?))
}

/// Store a new key and make it the provider's active one.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddKeyBody>,
) -> Result<Json<KeyListing>, ApiError> {
    let listing = state
        .keystore
        .add_key(&body.provider, &body.value, &body.name, &body.base_url)?;
    Ok(Json(listing))
}

/// Delete a key by id.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<KeyListing>, ApiError> {
    Ok(Json(state.keystore.delete_key(id)?))
}

/// Make a stored key the active one for its provider.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActivateBody>,
) -> Result<Json<KeyListing>, ApiError> {
    Ok(Json(state.keystore.activate_key(body.id)?))
}
