//! # Banana Studio
//!
//! A self-hosted web front-end for the remote PaperBanana figure-generation
//! pipeline.
//!
//! This library provides:
//! - An HTTP API for submitting, tracking, and cancelling generation tasks
//! - A single-slot lifecycle controller polling the remote pipeline
//! - An encrypted credential store for provider API keys
//!
//! ## Architecture
//!
//! One generation task is tracked at a time:
//! 1. A submission is validated and resolved against provider defaults
//! 2. The planner derives the stage schedule for the chosen mode
//! 3. The controller submits the task and polls the remote until a
//!    terminal status, a timeout, or a cancellation
//! 4. The presenter turns each snapshot into the stage chips the UI draws
//!
//! ## Example
//!
//! ```rust,ignore
//! use banana_studio::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod keystore;
pub mod providers;
pub mod workflow;

pub use config::Config;
pub use error::GenerationError;
