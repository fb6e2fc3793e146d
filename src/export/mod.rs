//! Video export module
//!
//! This module re-renders a finished recording into fixed presets by playing
//! it back through a letterboxing frame pump into a platform encoder.

pub mod audio;
pub mod canvas;
pub mod encoder;
pub mod geometry;
pub mod lock;
pub mod pipeline;
pub mod pump;
pub mod registry;
pub mod types;

pub use audio::{AudioFeed, AudioProbe, AudioRoute, AudioRouteSelector, FeedOwnership};
pub use geometry::{contain_fit, resolve_target, DrawRect, GeometryError, RenderTarget};
pub use lock::{SharedSource, SourceGuard};
pub use pipeline::{ExportPipeline, JobOutput};
pub use registry::ArtifactRegistry;
pub use types::{
    Artifact, ExportError, ExportEvent, ExportPreset, JobState, JobStatus, PipelineUpdate,
    TerminationReason, ORIGINAL_PRESET_ID, PRESETS,
};
