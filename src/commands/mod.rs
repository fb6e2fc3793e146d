//! Command handlers
//!
//! The surface the UI layer drives: requesting exports, reading job state,
//! fetching artifacts and managing the source recording.

pub mod export;

pub use export::{ExportController, ExportRequest};
