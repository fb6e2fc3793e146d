//! Recording handle and playback state snapshots

use crate::media::{PlaybackSource, FALLBACK_MEDIA_TYPE};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A finished in-memory recording
///
/// Cheap to clone: the payload and the playback element are shared.
#[derive(Clone)]
pub struct Recording {
    id: Uuid,
    payload: Arc<[u8]>,
    media_type: String,
    recorded_at: DateTime<Utc>,
    playback: Arc<dyn PlaybackSource>,
}

impl Recording {
    /// Wrap a finished payload and the element that plays it back
    pub fn new(
        payload: impl Into<Arc<[u8]>>,
        media_type: impl Into<String>,
        playback: Arc<dyn PlaybackSource>,
    ) -> Self {
        let media_type = media_type.into();
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            media_type: if media_type.is_empty() {
                FALLBACK_MEDIA_TYPE.to_string()
            } else {
                media_type
            },
            recorded_at: Utc::now(),
            playback,
        }
    }

    /// Assemble a recording from the chunks an encoder emitted while capturing
    pub fn from_chunks(
        chunks: impl IntoIterator<Item = Vec<u8>>,
        media_type: Option<&str>,
        playback: Arc<dyn PlaybackSource>,
    ) -> Self {
        let payload: Vec<u8> = chunks.into_iter().flatten().collect();
        Self::new(payload, media_type.unwrap_or_default(), playback)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Duration in seconds once the playback element knows it
    pub fn duration_secs(&self) -> Option<f64> {
        self.playback.metadata().and_then(|m| m.known_duration())
    }

    /// The playback element. Only the export controller touches it.
    pub(crate) fn playback(&self) -> &Arc<dyn PlaybackSource> {
        &self.playback
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("id", &self.id)
            .field("size", &self.payload.len())
            .field("media_type", &self.media_type)
            .field("recorded_at", &self.recorded_at)
            .finish()
    }
}

/// Playback position, mute and volume of a source at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub position_secs: f64,
    pub muted: bool,
    pub volume: f64,
}

impl PlaybackSnapshot {
    pub fn capture(source: &dyn PlaybackSource) -> Self {
        Self {
            position_secs: source.position(),
            muted: source.muted(),
            volume: source.volume(),
        }
    }

    /// Pause the source and put the captured values back
    pub fn restore(&self, source: &dyn PlaybackSource) {
        source.pause();
        source.seek(self.position_secs);
        source.set_muted(self.muted);
        source.set_volume(self.volume);
    }
}
