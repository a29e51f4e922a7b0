//! Submit-time request assembly and validation.
//!
//! Raw submit payloads arrive with optional fields and mixed key casing.
//! `GenerationRequest::build` resolves providers, models, pipeline flags
//! and reference images into a fully-specified request, or rejects the
//! payload with a validation error before anything touches the network.

use serde::Deserialize;

use crate::config::UploadLimits;
use crate::error::GenerationError;
use crate::providers::{self, ProviderCatalog, DEFAULT_PRESET};
use crate::workflow::{effective_critic_rounds, ExecMode};

/// Raw submit payload as received from the UI. Accepts both camelCase and
/// snake_case keys since historical clients sent either.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOptions {
    #[serde(default)]
    pub prompt: String,
    /// Legacy image preset ("nano-banana-pro" family).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "text_provider")]
    pub text_provider: Option<String>,
    #[serde(default, alias = "image_provider")]
    pub image_provider: Option<String>,
    #[serde(default, alias = "text_model")]
    pub text_model: Option<String>,
    #[serde(default, alias = "image_model")]
    pub image_model: Option<String>,
    #[serde(default, alias = "exp_mode")]
    pub exp_mode: Option<String>,
    #[serde(default, alias = "retrieval_setting")]
    pub retrieval_setting: Option<String>,
    #[serde(default, alias = "critic_enabled")]
    pub critic_enabled: Option<bool>,
    #[serde(default, alias = "eval_enabled")]
    pub eval_enabled: Option<bool>,
    #[serde(default, alias = "max_critic_rounds")]
    pub max_critic_rounds: Option<i64>,
    #[serde(default, alias = "aspect_ratio")]
    pub aspect_ratio: Option<String>,
    #[serde(default, alias = "image_size")]
    pub image_size: Option<String>,
    /// Reference images as `data:image/...;base64,` URLs, at most three.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, alias = "shut_progress")]
    pub shut_progress: Option<bool>,
}

/// Request-level defaults that come from server configuration rather than
/// the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    pub exp_mode: ExecMode,
    pub eval_enabled: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            exp_mode: ExecMode::DevFull,
            eval_enabled: true,
        }
    }
}

/// A validated reference image, kept as the original data URL for the wire
/// plus the parsed media type and decoded size.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub data_url: String,
    pub media_type: String,
    pub decoded_bytes: usize,
}

/// A fully-resolved generation request, ready to submit.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub preset: String,
    pub provider: String,
    pub text_provider: String,
    pub image_provider: String,
    pub text_model: String,
    pub image_model: String,
    pub exp_mode: ExecMode,
    pub retrieval_setting: String,
    pub critic_enabled: bool,
    pub max_critic_rounds: u8,
    pub eval_enabled: bool,
    pub aspect_ratio: String,
    pub image_size: String,
    pub reference_images: Vec<ReferenceImage>,
    pub shut_progress: bool,
}

impl GenerationRequest {
    /// Resolve a raw payload into a complete request.
    ///
    /// Provider aliases are normalized, missing models fall back to the
    /// catalog defaults for the resolved provider and then to the legacy
    /// preset mapping. An unrecognized non-empty mode string selects the
    /// full pipeline rather than being rejected.
    pub fn build(
        options: SubmitOptions,
        defaults: RequestDefaults,
        catalog: &ProviderCatalog,
        limits: &UploadLimits,
    ) -> Result<Self, GenerationError> {
        let prompt = options.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(GenerationError::Validation(
                "prompt must not be empty".into(),
            ));
        }

        let base_provider = options.provider.unwrap_or_default();
        let text_provider = providers::normalize_provider(
            options
                .text_provider
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(&base_provider),
        );
        let image_provider = providers::normalize_provider(
            options
                .image_provider
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(&base_provider),
        );
        let provider = image_provider.clone();

        let preset = options
            .model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PRESET)
            .to_string();

        let mut text_model = options
            .text_model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| catalog.defaults_for(&text_provider).text_model);
        let mut image_model = options
            .image_model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| catalog.defaults_for(&image_provider).image_model);
        if text_model.is_empty() || image_model.is_empty() {
            let (preset_text, preset_image) = providers::preset_models(&preset);
            if text_model.is_empty() {
                text_model = preset_text.to_string();
            }
            if image_model.is_empty() {
                image_model = preset_image.to_string();
            }
        }

        let exp_mode = match options.exp_mode.as_deref().map(str::trim) {
            None | Some("") => defaults.exp_mode,
            Some(raw) => ExecMode::parse_or_full(raw),
        };

        let retrieval_setting = options
            .retrieval_setting
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("none")
            .to_string();

        let critic_enabled = options.critic_enabled.unwrap_or(true);
        let max_critic_rounds = effective_critic_rounds(
            exp_mode,
            critic_enabled,
            options.max_critic_rounds.unwrap_or(3),
        );

        let mut eval_enabled = options.eval_enabled.unwrap_or(defaults.eval_enabled);
        if exp_mode.forces_eval_off() {
            eval_enabled = false;
        }

        let aspect_ratio = options
            .aspect_ratio
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("16:9")
            .to_string();
        let image_size = options
            .image_size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("1K")
            .to_string();

        if options.urls.len() > limits.max_reference_images {
            return Err(GenerationError::Validation(format!(
                "at most {} reference images are allowed",
                limits.max_reference_images
            )));
        }
        let mut reference_images = Vec::with_capacity(options.urls.len());
        for (index, url) in options.urls.iter().enumerate() {
            reference_images.push(validate_reference_image(index, url, limits)?);
        }

        Ok(Self {
            prompt,
            preset,
            provider,
            text_provider,
            image_provider,
            text_model,
            image_model,
            exp_mode,
            retrieval_setting,
            critic_enabled,
            max_critic_rounds,
            eval_enabled,
            aspect_ratio,
            image_size,
            reference_images,
            shut_progress: options.shut_progress.unwrap_or(false),
        })
    }
}

/// Parse and bounds-check a single `data:` reference image URL.
fn validate_reference_image(
    index: usize,
    url: &str,
    limits: &UploadLimits,
) -> Result<ReferenceImage, GenerationError> {
    use regex::Regex;
    use std::sync::LazyLock;

    static DATA_URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^data:([a-zA-Z0-9.+-]+/[a-zA-Z0-9.+-]+);base64,(.+)$").unwrap());

    let captures = DATA_URL_RE.captures(url).ok_or_else(|| {
        GenerationError::Validation(format!(
            "reference image {} is not a base64 data URL",
            index + 1
        ))
    })?;
    let media_type = captures[1].to_ascii_lowercase();
    if !media_type.starts_with("image/") {
        return Err(GenerationError::Validation(format!(
            "reference image {} has unsupported media type {}",
            index + 1,
            media_type
        )));
    }

    let payload = &captures[2];
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    let decoded_bytes = (payload.len() * 3) / 4 - padding.min(2);
    if decoded_bytes > limits.max_reference_image_bytes {
        return Err(GenerationError::Validation(format!(
            "reference image {} exceeds the {} MiB limit",
            index + 1,
            limits.max_reference_image_bytes / (1024 * 1024)
        )));
    }

    Ok(ReferenceImage {
        data_url: url.to_string(),
        media_type,
        decoded_bytes,
    })
}
