//! Audio route selection
//!
//! Builds the audio feed mixed into an export. Probes are tried in order and
//! the first one that produces a feed wins:
//!
//! 1. [`ElementCaptureProbe`]: take the audio track from a live capture of the
//!    playback element. The track belongs to the element and is never stopped
//!    here; stopping it can break capture for later exports.
//! 2. [`DecodeGraphProbe`]: decode the recording a second time into an audio
//!    graph with a muted monitoring path and a capture tap. The pipeline owns
//!    that graph and tears it down when the job ends.
//!
//! If every probe fails the export continues video-only.

use crate::export::types::ExportError;
use crate::media::{AudioGraph, MediaBackend, PlaybackSource, TrackHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Who is responsible for stopping the feed's track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOwnership {
    /// Belongs to the playback element; must not be stopped
    Borrowed,
    /// Created for this job; must be stopped and torn down
    Owned,
}

/// An audio track ready to be mixed into the export stream
pub struct AudioFeed {
    track: TrackHandle,
    ownership: FeedOwnership,
    graph: Option<Box<dyn AudioGraph>>,
    strategy: &'static str,
    released: bool,
}

impl AudioFeed {
    pub fn borrowed(track: TrackHandle, strategy: &'static str) -> Self {
        Self {
            track,
            ownership: FeedOwnership::Borrowed,
            graph: None,
            strategy,
            released: false,
        }
    }

    pub fn owned(track: TrackHandle, graph: Box<dyn AudioGraph>, strategy: &'static str) -> Self {
        Self {
            track,
            ownership: FeedOwnership::Owned,
            graph: Some(graph),
            strategy,
            released: false,
        }
    }

    pub fn track(&self) -> &TrackHandle {
        &self.track
    }

    pub fn ownership(&self) -> FeedOwnership {
        self.ownership
    }

    /// Name of the probe that built this feed
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Start the dedicated decoder, if any. Best effort.
    pub async fn start(&self) {
        if let Some(graph) = &self.graph {
            if let Err(e) = graph.start().await {
                tracing::warn!("Failed to start export audio decoder: {}", e);
            }
        }
    }

    /// Stop owned resources. Safe to call more than once.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.ownership == FeedOwnership::Borrowed {
            tracing::debug!("Leaving borrowed audio track {} running", self.track.id());
            return;
        }

        self.track.stop();
        if let Some(graph) = self.graph.take() {
            graph.pause();
            if let Err(e) = graph.close().await {
                tracing::warn!("Failed to close export audio graph: {}", e);
            }
        }
        tracing::debug!("Released owned audio feed from {}", self.strategy);
    }
}

impl Drop for AudioFeed {
    fn drop(&mut self) {
        if self.released || self.ownership == FeedOwnership::Borrowed {
            return;
        }
        tracing::warn!("Audio feed dropped without release, tearing down");
        self.track.stop();
        if let Some(graph) = self.graph.take() {
            graph.pause();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = graph.close().await {
                            tracing::warn!("Failed to close export audio graph: {}", e);
                        }
                    });
                }
                Err(_) => tracing::warn!("No runtime to close export audio graph"),
            }
        }
    }
}

/// Everything a probe may use to build a feed
pub struct ProbeContext<'a> {
    pub source: &'a dyn PlaybackSource,
    pub backend: &'a dyn MediaBackend,
    pub payload: &'a Arc<[u8]>,
    pub media_type: &'a str,
}

/// One way of obtaining export audio
#[async_trait]
pub trait AudioProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap capability check
    fn is_available(&self, cx: &ProbeContext<'_>) -> bool;

    async fn build(&self, cx: &ProbeContext<'_>) -> Result<AudioFeed, ExportError>;
}

/// Audio from a live capture of the playback element
pub struct ElementCaptureProbe;

#[async_trait]
impl AudioProbe for ElementCaptureProbe {
    fn name(&self) -> &'static str {
        "element-capture"
    }

    fn is_available(&self, cx: &ProbeContext<'_>) -> bool {
        cx.source.supports_capture()
    }

    async fn build(&self, cx: &ProbeContext<'_>) -> Result<AudioFeed, ExportError> {
        let stream = cx
            .source
            .capture_stream()
            .map_err(|e| ExportError::AudioRouteFailed(e.to_string()))?;
        let track = stream.audio_tracks().next().cloned().ok_or_else(|| {
            ExportError::AudioRouteFailed("Element capture has no audio track".to_string())
        })?;
        Ok(AudioFeed::borrowed(track, self.name()))
    }
}

/// Audio from a dedicated decoder routed through a silent graph
pub struct DecodeGraphProbe;

#[async_trait]
impl AudioProbe for DecodeGraphProbe {
    fn name(&self) -> &'static str {
        "decode-graph"
    }

    fn is_available(&self, _cx: &ProbeContext<'_>) -> bool {
        true
    }

    async fn build(&self, cx: &ProbeContext<'_>) -> Result<AudioFeed, ExportError> {
        let graph = cx
            .backend
            .open_audio_graph(cx.payload.clone(), cx.media_type)
            .await
            .map_err(|e| ExportError::AudioRouteFailed(e.to_string()))?;

        // Nothing may be audible locally; the capture tap is unaffected
        graph.set_monitor_gain(0.0);

        let Some(track) = graph.capture_track() else {
            if let Err(e) = graph.close().await {
                tracing::warn!("Failed to close export audio graph: {}", e);
            }
            return Err(ExportError::AudioRouteFailed(
                "Audio graph exposes no capture track".to_string(),
            ));
        };

        if graph.is_suspended() {
            if let Err(e) = graph.resume().await {
                tracing::debug!("Audio graph did not resume: {}", e);
            }
        }

        Ok(AudioFeed::owned(track, graph, self.name()))
    }
}

/// Result of audio route selection
pub struct AudioRoute {
    /// None means the export is video-only
    pub feed: Option<AudioFeed>,
    /// Failures of the probes that were tried
    pub warnings: Vec<String>,
}

/// Ordered list of audio probes
pub struct AudioRouteSelector {
    probes: Vec<Box<dyn AudioProbe>>,
}

impl Default for AudioRouteSelector {
    fn default() -> Self {
        Self::new(vec![Box::new(ElementCaptureProbe), Box::new(DecodeGraphProbe)])
    }
}

impl AudioRouteSelector {
    pub fn new(probes: Vec<Box<dyn AudioProbe>>) -> Self {
        Self { probes }
    }

    /// Try each probe in order; the first feed wins
    pub async fn select(&self, cx: &ProbeContext<'_>) -> AudioRoute {
        let mut warnings = Vec::new();

        for probe in &self.probes {
            if !probe.is_available(cx) {
                tracing::debug!("Audio probe {} unavailable", probe.name());
                continue;
            }
            match probe.build(cx).await {
                Ok(feed) => {
                    tracing::info!(
                        "Export audio via {} ({:?})",
                        probe.name(),
                        feed.ownership()
                    );
                    return AudioRoute {
                        feed: Some(feed),
                        warnings,
                    };
                }
                Err(e) => {
                    tracing::debug!("Audio probe {} failed: {}", probe.name(), e);
                    warnings.push(format!("{}: {}", probe.name(), e));
                }
            }
        }

        let error = ExportError::AudioRouteFailed(if warnings.is_empty() {
            "No audio route available".to_string()
        } else {
            warnings.join("; ")
        });
        tracing::warn!("{}; exporting video only", error);

        AudioRoute {
            feed: None,
            warnings: vec![error.to_string()],
        }
    }
}
