//! Provider catalog.
//!
//! Normalizes vendor identifiers, carries per-provider defaults (base URL,
//! text/image models, auth header shape), and loads optional overrides from
//! a YAML file. Consulted when a submission omits model identifiers and when
//! the remote client builds request headers.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Providers with built-in model defaults, in display order.
pub const KNOWN_PROVIDERS: [&str; 6] =
    ["grsai", "openai", "deepseek", "openrouter", "anthropic", "google"];

/// Image-generation presets accepted in place of an explicit model id.
pub const IMAGE_PRESETS: [&str; 4] =
    ["nano-banana-fast", "nano-banana", "nano-banana-pro", "nano-banana-pro-vt"];

/// Preset used when a submission names no model at all.
pub const DEFAULT_PRESET: &str = "nano-banana-pro";

/// Collapse vendor aliases onto canonical provider identifiers.
///
/// Unknown non-empty values pass through trimmed and lowercased so a new
/// vendor can be used before it has first-class support; an empty value
/// selects the default draw host.
pub fn normalize_provider(raw: &str) -> String {
    let p = raw.trim().to_lowercase();
    match p.as_str() {
        "chatgpt" | "gpt" | "openai" => "openai".to_string(),
        "claude" | "anthropic" => "anthropic".to_string(),
        "openrouter" | "openruter" => "openrouter".to_string(),
        "grsai" | "grs" => "grsai".to_string(),
        "deepseek" => "deepseek".to_string(),
        "google" | "gemini" => "google".to_string(),
        "" => "grsai".to_string(),
        _ => p,
    }
}

/// Default API base URL for a provider, when one exists.
///
/// The draw host doubles as the grsai base; OpenAI-compatible vendors have
/// fixed bases; everything else must be configured per key.
pub fn default_base_url(provider: &str, api_host: &str) -> Option<String> {
    match provider {
        "grsai" => Some(format!("{}/v1", api_host.trim_end_matches('/'))),
        "openai" => Some("https://api.openai.com/v1".to_string()),
        "deepseek" => Some("https://api.deepseek.com/v1".to_string()),
        "openrouter" => Some("https://openrouter.ai/api/v1".to_string()),
        "anthropic" => Some("https://api.anthropic.com".to_string()),
        _ => None,
    }
}

/// Request headers carrying a credential for a provider.
///
/// Anthropic keys ride in `x-api-key` with a pinned API version; every
/// other vendor takes a bearer token.
pub fn auth_headers(provider: &str, api_key: &str) -> Vec<(&'static str, String)> {
    if provider == "anthropic" {
        vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", "2023-06-01".to_string()),
        ]
    } else {
        vec![("Authorization", format!("Bearer {}", api_key))]
    }
}

/// Resolve an image preset to the (text model, image model) pair it implies.
/// Unknown presets fall back to [`DEFAULT_PRESET`].
pub fn preset_models(preset: &str) -> (&'static str, &'static str) {
    match preset.trim() {
        "nano-banana-fast" => ("nano-banana-fast", "nano-banana-fast"),
        "nano-banana" => ("nano-banana", "nano-banana"),
        "nano-banana-pro-vt" => ("nano-banana-pro-vt", "nano-banana-pro-vt"),
        _ => ("nano-banana-pro", "nano-banana-pro"),
    }
}

/// Default text/image models for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefaults {
    /// Model used for the text lane when the submission names none
    #[serde(default)]
    pub text_model: String,

    /// Model used for the image lane when the submission names none
    #[serde(default)]
    pub image_model: String,
}

/// Override file structure for provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    providers: HashMap<String, ModelDefaults>,
}

/// Per-provider model defaults, built-ins merged with file overrides.
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    defaults: HashMap<String, ModelDefaults>,
}

impl ProviderCatalog {
    /// Build the catalog, merging overrides from `providers_file` when set.
    pub fn load(providers_file: Option<&Path>) -> Self {
        let mut defaults = builtin_defaults();
        if let Some(path) = providers_file {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_yaml::from_str::<CatalogFile>(&contents) {
                    Ok(file) => {
                        for (provider, models) in file.providers {
                            let provider = normalize_provider(&provider);
                            let entry = defaults.entry(provider).or_default();
                            if !models.text_model.is_empty() {
                                entry.text_model = models.text_model;
                            }
                            if !models.image_model.is_empty() {
                                entry.image_model = models.image_model;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    }
                },
                Err(_) => {
                    tracing::info!("No providers file at {}. Using defaults.", path.display());
                }
            }
        }
        Self { defaults }
    }

    /// Defaults for a provider; empty fields mean no default exists.
    pub fn defaults_for(&self, provider: &str) -> ModelDefaults {
        self.defaults
            .get(&normalize_provider(provider))
            .cloned()
            .unwrap_or_default()
    }

    /// Providers the catalog carries defaults for, sorted by name.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.defaults.keys().cloned().collect();
        names.sort();
        names
    }
}

fn builtin_defaults() -> HashMap<String, ModelDefaults> {
    let mut map = HashMap::new();
    let mut insert = |provider: &str, text: &str, image: &str| {
        map.insert(
            provider.to_string(),
            ModelDefaults {
                text_model: text.to_string(),
                image_model: image.to_string(),
            },
        );
    };
    insert("grsai", "gemini-2.5-pro", "nano-banana-pro");
    insert("openai", "gpt-4o-mini", "gpt-image-1");
    insert("deepseek", "deepseek-chat", "gpt-image-1");
    insert("openrouter", "openai/gpt-4o-mini", "gpt-image-1");
    insert("anthropic", "claude-3-5-sonnet-latest", "gpt-image-1");
    insert("google", "gemini-2.5-pro", "gemini-3-pro-image-preview");
    map
}
