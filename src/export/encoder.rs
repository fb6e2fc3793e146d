//! Encoder/mux session
//!
//! Wraps a platform encoder bound to the combined export stream: picks the
//! best supported container/codec, collects the chunks it flushes on a fixed
//! interval and concatenates them into one output on stop.

use crate::export::types::ExportError;
use crate::media::{mime, MediaBackend, MediaEncoder, MediaStream, FALLBACK_MEDIA_TYPE};
use std::time::Duration;
use tokio::sync::mpsc;

/// Pick the first candidate the backend supports
pub fn select_media_type(backend: &dyn MediaBackend, candidates: &[String]) -> Option<String> {
    mime::supported_candidates(backend, candidates)
        .into_iter()
        .next()
}

/// Concatenated encoder output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    /// Media type the encoder actually used
    pub media_type: String,
    pub chunk_count: usize,
}

/// One encoder run over one stream
pub struct EncoderSession {
    encoder: Box<dyn MediaEncoder>,
    requested_type: String,
    chunks_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    chunks_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    started: bool,
}

impl EncoderSession {
    /// Bind an encoder to `stream` using the best supported candidate
    ///
    /// Fails with [`ExportError::UnsupportedFormat`] when no candidate is
    /// supported; nothing is created in that case.
    pub fn open(
        backend: &dyn MediaBackend,
        stream: &MediaStream,
        candidates: &[String],
    ) -> Result<Self, ExportError> {
        let requested_type =
            select_media_type(backend, candidates).ok_or(ExportError::UnsupportedFormat)?;

        let encoder = backend
            .create_encoder(stream, &requested_type)
            .map_err(|e| ExportError::EncoderFault(e.to_string()))?;

        tracing::info!(
            "Encoder opened: {} ({} video, {} audio tracks)",
            requested_type,
            stream.video_tracks().count(),
            stream.audio_tracks().count()
        );

        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        Ok(Self {
            encoder,
            requested_type,
            chunks_tx: Some(chunks_tx),
            chunks_rx,
            started: false,
        })
    }

    pub fn requested_type(&self) -> &str {
        &self.requested_type
    }

    /// Start encoding, flushing a chunk every `timeslice`
    pub fn start(&mut self, timeslice: Duration) -> Result<(), ExportError> {
        let sink = self
            .chunks_tx
            .take()
            .ok_or_else(|| ExportError::EncoderFault("Encoder already started".to_string()))?;
        self.encoder
            .start(timeslice, sink)
            .map_err(|e| ExportError::EncoderFault(e.to_string()))?;
        self.started = true;
        Ok(())
    }

    /// Stop encoding and concatenate everything that was flushed
    pub async fn finish(mut self) -> Result<EncodedOutput, ExportError> {
        if !self.started {
            return Err(ExportError::EncoderFault(
                "Encoder was never started".to_string(),
            ));
        }

        self.encoder
            .stop()
            .await
            .map_err(|e| ExportError::EncoderFault(e.to_string()))?;
        self.started = false;

        // Stop accepting new chunks, then drain what is buffered
        self.chunks_rx.close();
        let mut bytes = Vec::new();
        let mut chunk_count = 0;
        while let Some(chunk) = self.chunks_rx.recv().await {
            if chunk.is_empty() {
                continue;
            }
            bytes.extend_from_slice(&chunk);
            chunk_count += 1;
        }

        let mut media_type = self.encoder.media_type();
        if media_type.is_empty() {
            media_type = if self.requested_type.is_empty() {
                FALLBACK_MEDIA_TYPE.to_string()
            } else {
                self.requested_type.clone()
            };
        }
        if media_type != self.requested_type {
            tracing::info!(
                "Encoder substituted {} for requested {}",
                media_type,
                self.requested_type
            );
        }

        Ok(EncodedOutput {
            bytes,
            media_type,
            chunk_count,
        })
    }

    /// Stop a session whose output is not wanted
    pub async fn abort(mut self) {
        if !self.started {
            return;
        }
        if let Err(e) = self.encoder.stop().await {
            tracing::warn!("Failed to stop encoder: {}", e);
        }
        self.chunks_rx.close();
    }
}
