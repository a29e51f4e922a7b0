//! Configuration management for banana-studio.
//!
//! Configuration can be set via environment variables:
//! - `BANANA_STUDIO_HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `BANANA_STUDIO_PORT` - Optional. Server port. Defaults to `8787`.
//! - `BANANA_STUDIO_DATA_DIR` - Optional. Directory for the credential database. Defaults to `~/.banana-studio`.
//! - `BANANA_STUDIO_API_HOST` - Optional. Base URL of the remote draw API. Defaults to `https://grsaiapi.com`.
//! - `BANANA_STUDIO_POLL_INTERVAL_SECS` - Optional. Seconds between result polls. Defaults to `5`.
//! - `BANANA_STUDIO_POLL_MAX_ATTEMPTS` - Optional. Poll ceiling before a task is declared timed out. Defaults to `240`.
//! - `BANANA_STUDIO_MAX_REFERENCE_IMAGES` - Optional. Reference images accepted per request. Defaults to `3`.
//! - `BANANA_STUDIO_MAX_REFERENCE_IMAGE_BYTES` - Optional. Decoded size cap per reference image. Defaults to `5242880`.
//! - `BANANA_STUDIO_SECRET_KEY` - Passphrase protecting stored credentials. Required unless `DEV_MODE` is on.
//! - `BANANA_STUDIO_EXP_MODE` - Optional. Default pipeline execution mode. Defaults to `dev_full`.
//! - `BANANA_STUDIO_DO_EVAL` - Optional. Whether evaluation runs when a submission leaves it unset. Defaults to `true`.
//! - `BANANA_STUDIO_PROVIDERS_FILE` - Optional. YAML file overriding per-provider default models.
//! - `DEV_MODE` - Optional. Relaxed defaults for local development.

use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Remote draw-API configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the remote pipeline host
    pub api_host: String,

    /// Path of the submission endpoint
    pub draw_path: String,

    /// Path of the result-poll endpoint
    pub result_path: String,

    /// Path of the cancel endpoint
    pub cancel_path: String,

    /// Seconds to sleep between result polls
    pub poll_interval_secs: u64,

    /// Poll attempts before the task is declared timed out
    pub poll_max_attempts: u32,

    /// Per-request timeout for remote calls
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_host: "https://grsaiapi.com".to_string(),
            draw_path: "/v1/draw/completions".to_string(),
            result_path: "/v1/draw/result".to_string(),
            cancel_path: "/v1/draw/cancel".to_string(),
            poll_interval_secs: 5,
            poll_max_attempts: 240,
            request_timeout_secs: 60,
        }
    }
}

impl RemoteConfig {
    pub fn draw_url(&self) -> String {
        join_url(&self.api_host, &self.draw_path)
    }

    pub fn result_url(&self) -> String {
        join_url(&self.api_host, &self.result_path)
    }

    pub fn cancel_url(&self) -> String {
        join_url(&self.api_host, &self.cancel_path)
    }
}

/// Bounds on user-supplied reference images.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// Maximum number of reference images per request
    pub max_reference_images: usize,

    /// Maximum decoded size of a single reference image in bytes
    pub max_reference_image_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_reference_images: 3,
            max_reference_image_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory holding the credential database
    pub data_dir: PathBuf,

    /// Development mode (relaxed requirements; more verbose defaults)
    pub dev_mode: bool,

    /// Remote draw-API configuration
    pub remote: RemoteConfig,

    /// Reference-image bounds
    pub limits: UploadLimits,

    /// Passphrase for encrypting credentials at rest
    pub secret_key: Option<String>,

    /// Execution mode used when a submission does not name one
    pub default_exp_mode: String,

    /// Evaluation toggle used when a submission does not set one
    pub default_eval: bool,

    /// Optional YAML file overriding per-provider default models
    pub providers_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `BANANA_STUDIO_SECRET_KEY` is
    /// not set outside dev mode, or `ConfigError::InvalidValue` for
    /// unparseable numeric/boolean values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("BANANA_STUDIO_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("BANANA_STUDIO_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("BANANA_STUDIO_PORT".to_string(), format!("{}", e)))?;

        let data_dir = std::env::var("BANANA_STUDIO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let dev_mode = std::env::var("DEV_MODE")
            .ok()
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("DEV_MODE".to_string(), e)))
            .transpose()?
            // In debug builds, default to dev_mode=true; in release, default to false.
            .unwrap_or(cfg!(debug_assertions));

        let api_host = std::env::var("BANANA_STUDIO_API_HOST")
            .unwrap_or_else(|_| "https://grsaiapi.com".to_string());
        Url::parse(&api_host).map_err(|e| {
            ConfigError::InvalidValue("BANANA_STUDIO_API_HOST".to_string(), format!("{}", e))
        })?;
        let mut remote = RemoteConfig {
            api_host,
            ..RemoteConfig::default()
        };
        if let Ok(v) = std::env::var("BANANA_STUDIO_POLL_INTERVAL_SECS") {
            remote.poll_interval_secs = v.parse().map_err(|e| {
                ConfigError::InvalidValue("BANANA_STUDIO_POLL_INTERVAL_SECS".to_string(), format!("{}", e))
            })?;
        }
        if let Ok(v) = std::env::var("BANANA_STUDIO_POLL_MAX_ATTEMPTS") {
            remote.poll_max_attempts = v.parse().map_err(|e| {
                ConfigError::InvalidValue("BANANA_STUDIO_POLL_MAX_ATTEMPTS".to_string(), format!("{}", e))
            })?;
        }

        let mut limits = UploadLimits::default();
        if let Ok(v) = std::env::var("BANANA_STUDIO_MAX_REFERENCE_IMAGES") {
            limits.max_reference_images = v.parse().map_err(|e| {
                ConfigError::InvalidValue("BANANA_STUDIO_MAX_REFERENCE_IMAGES".to_string(), format!("{}", e))
            })?;
        }
        if let Ok(v) = std::env::var("BANANA_STUDIO_MAX_REFERENCE_IMAGE_BYTES") {
            limits.max_reference_image_bytes = v.parse().map_err(|e| {
                ConfigError::InvalidValue("BANANA_STUDIO_MAX_REFERENCE_IMAGE_BYTES".to_string(), format!("{}", e))
            })?;
        }

        let secret_key = std::env::var("BANANA_STUDIO_SECRET_KEY").ok().filter(|v| !v.trim().is_empty());

        // Outside dev mode, refuse to start without a cipher passphrase so
        // credentials are never persisted in plaintext.
        if !dev_mode && secret_key.is_none() {
            return Err(ConfigError::MissingEnvVar("BANANA_STUDIO_SECRET_KEY".to_string()));
        }

        let default_exp_mode =
            std::env::var("BANANA_STUDIO_EXP_MODE").unwrap_or_else(|_| "dev_full".to_string());

        let default_eval = std::env::var("BANANA_STUDIO_DO_EVAL")
            .ok()
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("BANANA_STUDIO_DO_EVAL".to_string(), e))
            })
            .transpose()?
            .unwrap_or(true);

        let providers_file = std::env::var("BANANA_STUDIO_PROVIDERS_FILE").ok().map(PathBuf::from);

        Ok(Self {
            host,
            port,
            data_dir,
            dev_mode,
            remote,
            limits,
            secret_key,
            default_exp_mode,
            default_eval,
            providers_file,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_host: String, data_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            data_dir,
            dev_mode: true,
            remote: RemoteConfig {
                api_host,
                ..RemoteConfig::default()
            },
            limits: UploadLimits::default(),
            secret_key: None,
            default_exp_mode: "dev_full".to_string(),
            default_eval: true,
            providers_file: None,
        }
    }

    /// Request-level defaults derived from this configuration.
    pub fn request_defaults(&self) -> crate::generation::RequestDefaults {
        crate::generation::RequestDefaults {
            exp_mode: crate::workflow::ExecMode::parse_or_full(&self.default_exp_mode),
            eval_enabled: self.default_eval,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".banana-studio"))
        .unwrap_or_else(|_| PathBuf::from(".banana-studio"))
}

fn join_url(host: &str, path: &str) -> String {
    format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
