//! Generation task lifecycle: request assembly, the remote client, the
//! task state machine, the controller driving it and the progress
//! presenter.

pub mod client;
pub mod controller;
pub mod progress;
pub mod request;
pub mod task;

pub use client::{HttpJobClient, JobClient, PollSnapshot, RemoteStatus, ResultItem};
pub use controller::{GenerationController, Sleeper, TokioSleeper};
pub use progress::{display_model, DisplayModel};
pub use request::{GenerationRequest, RequestDefaults, SubmitOptions};
pub use task::{TaskPhase, TaskSnapshot};
