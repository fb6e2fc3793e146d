//! Collaborator trait definitions
//!
//! Platform-agnostic interfaces for everything the export pipeline consumes
//! from the capture and codec layers: the shared playback element, media
//! tracks, the render target track, the audio routing graph and the encoder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Errors reported by platform collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Draw error: {0}")]
    Draw(String),

    #[error("Audio graph error: {0}")]
    AudioGraph(String),

    #[error("Encoder error: {0}")]
    Encoder(String),
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A live media track handle
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Unique track ID
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Stop the track. Stopping is permanent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Shared handle to a media track
pub type TrackHandle = Arc<dyn MediaTrack>;

/// A set of tracks handed to an encoder as one stream
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<TrackHandle>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&mut self, track: TrackHandle) {
        self.tracks.push(track);
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &TrackHandle> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &TrackHandle> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }
}

/// Metadata reported by a playback source once it has loaded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// Duration in seconds (None while unknown or unbounded)
    pub duration_secs: Option<f64>,
    /// Native frame width in pixels
    pub width: u32,
    /// Native frame height in pixels
    pub height: u32,
}

impl SourceMetadata {
    /// Duration if it is a usable, finite, non-zero value
    pub fn known_duration(&self) -> Option<f64> {
        self.duration_secs.filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Notifications emitted by a playback source
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Duration and native dimensions became available
    MetadataLoaded,
    /// A new frame was decoded and presented
    FrameReady,
    /// Playback reached end of stream
    Ended,
    /// The element reported an error
    Error(String),
}

/// A decoded RGBA video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, row-major
    pub data: Vec<u8>,
}

/// The playback element showing the finished recording
///
/// Only one export may drive it at a time; the controller hands it out
/// through an exclusive guard.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Loaded metadata, or None if the element has not loaded yet
    fn metadata(&self) -> Option<SourceMetadata>;

    /// Force the element to (re)load its media
    fn reload(&self);

    /// Subscribe to playback notifications
    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;

    async fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);

    /// Current playback position in seconds
    fn position(&self) -> f64;

    fn seek(&self, position_secs: f64);

    fn muted(&self) -> bool;

    fn set_muted(&self, muted: bool);

    fn volume(&self) -> f64;

    fn set_volume(&self, volume: f64);

    /// Whether the element can notify once per decoded frame
    fn supports_frame_callbacks(&self) -> bool;

    /// Whether the element can expose a live capture of its decoded output
    fn supports_capture(&self) -> bool;

    /// Live capture of the element's decoded output
    fn capture_stream(&self) -> Result<MediaStream, MediaError>;

    /// The frame currently presented by the element
    fn current_frame(&self) -> Result<VideoFrame, MediaError>;
}

/// A video track fed from a rendered frame buffer
pub trait CanvasTrack: Send {
    fn track(&self) -> TrackHandle;

    /// Publish a `width`x`height` RGBA buffer (row-major) as the next frame
    fn submit(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), MediaError>;
}

/// An audio routing graph fed by a dedicated decoder of the recording
///
/// The graph has two outputs: a monitoring path to the local speakers and a
/// capture tap exposed as a track.
#[async_trait]
pub trait AudioGraph: Send + Sync {
    /// The capture tap as a track
    fn capture_track(&self) -> Option<TrackHandle>;

    /// Gain on the monitoring path only
    fn set_monitor_gain(&self, gain: f32);

    fn is_suspended(&self) -> bool;

    async fn resume(&self) -> Result<(), MediaError>;

    /// Rewind the dedicated decoder to zero and start it
    async fn start(&self) -> Result<(), MediaError>;

    fn pause(&self);

    /// Disconnect every node and close the underlying audio context
    async fn close(&self) -> Result<(), MediaError>;
}

/// A platform encoder/muxer bound to one stream
#[async_trait]
pub trait MediaEncoder: Send {
    /// Begin encoding, flushing a chunk into `sink` every `timeslice`
    fn start(
        &mut self,
        timeslice: Duration,
        sink: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<(), MediaError>;

    /// Stop encoding; resolves after the final chunk has been flushed
    async fn stop(&mut self) -> Result<(), MediaError>;

    /// Media type actually in use (may differ from the requested one)
    fn media_type(&self) -> String;
}

/// Device/codec capability layer
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Whether the encoder accepts the given container/codec string
    fn is_type_supported(&self, media_type: &str) -> bool;

    fn create_canvas_track(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn CanvasTrack>, MediaError>;

    /// Open a dedicated decoder for the recording wired into a fresh audio graph
    async fn open_audio_graph(
        &self,
        payload: Arc<[u8]>,
        media_type: &str,
    ) -> Result<Box<dyn AudioGraph>, MediaError>;

    fn create_encoder(
        &self,
        stream: &MediaStream,
        media_type: &str,
    ) -> Result<Box<dyn MediaEncoder>, MediaError>;
}
