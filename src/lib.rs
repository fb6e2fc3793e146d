//! Open Recast - re-render finished screen recordings into fixed presets.
//!
//! This is the main library crate. It plays an in-memory recording back
//! through a letterboxing frame pump into a platform encoder and keeps the
//! resulting artifacts per preset. Platform media facilities are reached
//! through the traits in [`media`].

pub mod commands;
pub mod config;
pub mod export;
pub mod logging;
pub mod media;
pub mod recorder;
pub mod utils;

pub use commands::{ExportController, ExportRequest};
pub use config::{AppConfig, ExportConfig, LoggingConfig};
pub use export::{Artifact, ExportError, ExportEvent, ExportPreset, JobState, JobStatus};
pub use recorder::Recording;
pub use utils::{AppError, AppResult, ErrorResponse};
