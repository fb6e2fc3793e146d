//! Platform collaborator interfaces
//!
//! The playback element, track, encoder and audio graph abstractions the
//! export pipeline is written against.

pub mod mime;
pub mod traits;

#[cfg(test)]
pub(crate) mod fake;

pub use mime::{default_candidates, extension_for, pretty_bytes, FALLBACK_MEDIA_TYPE};
pub use traits::{
    AudioGraph, CanvasTrack, MediaBackend, MediaEncoder, MediaError, MediaStream, MediaTrack,
    PlaybackEvent, PlaybackSource, SourceMetadata, TrackHandle, TrackKind, VideoFrame,
};
