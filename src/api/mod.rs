//! HTTP API for the studio front-end.

pub mod generation;
pub mod keys;
pub mod providers;
pub mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
