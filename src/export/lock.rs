//! Exclusive access to the shared playback element

use crate::export::types::ExportError;
use crate::media::PlaybackSource;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The playback element plus the lock every export must hold to drive it
#[derive(Clone)]
pub struct SharedSource {
    playback: Arc<dyn PlaybackSource>,
    lock: Arc<Mutex<()>>,
}

impl SharedSource {
    pub fn new(playback: Arc<dyn PlaybackSource>) -> Self {
        Self {
            playback,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Take the lock without waiting
    ///
    /// Requests are never queued: a held lock is [`ExportError::SourceBusy`].
    pub fn try_acquire(&self) -> Result<SourceGuard, ExportError> {
        let permit = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| ExportError::SourceBusy)?;
        Ok(SourceGuard {
            playback: self.playback.clone(),
            _permit: permit,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Proof of exclusive access; the lock is released on drop
pub struct SourceGuard {
    playback: Arc<dyn PlaybackSource>,
    _permit: OwnedMutexGuard<()>,
}

impl Deref for SourceGuard {
    type Target = dyn PlaybackSource;

    fn deref(&self) -> &Self::Target {
        self.playback.as_ref()
    }
}
