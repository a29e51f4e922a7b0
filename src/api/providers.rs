//! Provider catalog API.
//!
//! Lists providers with their default models, base URLs, and whether an
//! active credential is stored, so the front-end can render provider and
//! model selectors. Only providers holding an active key are offered for
//! submission.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::routes::AppState;
use super::types::ApiError;
use crate::providers::{default_base_url, DEFAULT_PRESET, IMAGE_PRESETS};

/// One provider as the model selector consumes it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Canonical provider identifier
    pub id: String,

    /// Default API base URL, when the provider has a fixed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used for the text lane when a submission names none
    pub text_model: String,

    /// Model used for the image lane when a submission names none
    pub image_model: String,

    /// Whether an active credential is stored for this provider
    pub has_active_key: bool,
}

/// Query parameters for the providers endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersQuery {
    /// Include providers without an active credential.
    #[serde(default)]
    pub include_all: bool,
}

/// Response for the providers endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,

    /// Image presets accepted in place of an explicit model id
    pub presets: Vec<&'static str>,

    /// Preset used when a submission names no model
    pub default_preset: &'static str,
}

/// List providers with model defaults and credential status.
///
/// By default only providers with an active key are returned, since those
/// are the ones a submission can actually use; `include_all` widens the
/// list to the full catalog for the key-management panel.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProvidersQuery>,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let active = state.keystore.active_providers()?;

    let mut names = state.catalog.providers();
    for provider in &active {
        if !names.contains(provider) {
            names.push(provider.clone());
        }
    }
    names.sort();

    let providers = names
        .into_iter()
        .filter(|name| query.include_all || active.contains(name))
        .map(|id| {
            let defaults = state.catalog.defaults_for(&id);
            ProviderInfo {
                base_url: default_base_url(&id, &state.config.remote.api_host),
                text_model: defaults.text_model,
                image_model: defaults.image_model,
                has_active_key: active.contains(&id),
                id,
            }
        })
        .collect();

    Ok(Json(ProvidersResponse {
        providers,
        presets: IMAGE_PRESETS.to_vec(),
        default_preset: DEFAULT_PRESET,
    }))
}
