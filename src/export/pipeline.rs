//! Export pipeline orchestration
//!
//! Runs one export job against the locked playback source: waits for
//! metadata, builds the render target, audio feed and encoder, plays the
//! source through the frame pump and collects the encoded artifact.
//! Owned resources are released and the source's playback state is put back
//! on every exit path.

use crate::config::ExportConfig;
use crate::export::audio::{AudioFeed, AudioRouteSelector, ProbeContext};
use crate::export::canvas::FrameCanvas;
use crate::export::encoder::{EncodedOutput, EncoderSession};
use crate::export::geometry::{resolve_target, RenderTarget};
use crate::export::lock::SourceGuard;
use crate::export::pump::{safety_timeout, FramePump, PumpMode, PumpReport, SafetyTimer, Termination};
use crate::export::types::{
    Artifact, ExportError, ExportPreset, JobState, PipelineUpdate, TerminationReason,
};
use crate::media::{
    CanvasTrack, MediaBackend, MediaStream, PlaybackEvent, PlaybackSource, SourceMetadata,
};
use crate::recorder::{PlaybackSnapshot, Recording};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of a successful job
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub artifact: Artifact,
    pub termination: TerminationReason,
    pub frames_drawn: u64,
    pub chunk_count: usize,
}

/// Restores the source's playback state when dropped
struct RestoreGuard<'a> {
    source: &'a dyn PlaybackSource,
    snapshot: PlaybackSnapshot,
}

impl<'a> RestoreGuard<'a> {
    fn capture(source: &'a dyn PlaybackSource) -> Self {
        Self {
            source,
            snapshot: PlaybackSnapshot::capture(source),
        }
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.snapshot.restore(self.source);
        tracing::debug!(
            "Restored playback state (position {:.2}s, muted {}, volume {:.2})",
            self.snapshot.position_secs,
            self.snapshot.muted,
            self.snapshot.volume
        );
    }
}

/// One export of one recording to one preset
pub struct ExportPipeline {
    recording: Recording,
    preset: &'static ExportPreset,
    backend: Arc<dyn MediaBackend>,
    config: ExportConfig,
    selector: Arc<AudioRouteSelector>,
}

impl ExportPipeline {
    pub fn new(
        recording: Recording,
        preset: &'static ExportPreset,
        backend: Arc<dyn MediaBackend>,
        config: ExportConfig,
        selector: Arc<AudioRouteSelector>,
    ) -> Self {
        Self {
            recording,
            preset,
            backend,
            config,
            selector,
        }
    }

    /// Run the job to completion
    ///
    /// The caller keeps `guard` and decides when the source is released.
    /// Playback state is restored and owned resources are released before
    /// this returns.
    pub async fn run<F>(self, guard: &SourceGuard, mut report: F) -> Result<JobOutput, ExportError>
    where
        F: FnMut(PipelineUpdate) + Send,
    {
        let source: &dyn PlaybackSource = &**guard;
        tracing::info!(
            "Starting {} export of recording {}",
            self.preset.id,
            self.recording.id()
        );

        let _restore = RestoreGuard::capture(source);

        // 1. Metadata
        let metadata = wait_for_metadata(source, self.config.metadata_timeout()).await?;
        let target = resolve_target(self.preset, Some(&metadata), &self.config);
        tracing::info!(
            "Source {}x{} ({:?}s) -> {}x{} @ {}fps",
            metadata.width,
            metadata.height,
            metadata.duration_secs,
            target.width,
            target.height,
            target.fps
        );

        // 2. Render target track
        let mut canvas_track = self
            .backend
            .create_canvas_track(target.width, target.height, target.fps)
            .map_err(|e| ExportError::EncoderFault(e.to_string()))?;
        let video_track = canvas_track.track();

        // 3. Audio feed
        let payload = self.recording.payload().clone();
        let route = self
            .selector
            .select(&ProbeContext {
                source,
                backend: self.backend.as_ref(),
                payload: &payload,
                media_type: self.recording.media_type(),
            })
            .await;
        for warning in route.warnings {
            report(PipelineUpdate::Warning(warning));
        }
        let mut feed = route.feed;

        let mut stream = MediaStream::new();
        stream.add_track(video_track.clone());
        if let Some(feed) = &feed {
            stream.add_track(feed.track().clone());
        }

        let result = self
            .render(
                source,
                canvas_track.as_mut(),
                &stream,
                feed.as_ref(),
                target,
                metadata,
                &mut report,
            )
            .await;

        // 4. Cleanup, whatever the outcome
        if let Some(feed) = feed.as_mut() {
            feed.release().await;
        }
        video_track.stop();

        let (output, pump) = result?;
        tracing::info!(
            "{} export finished ({:?}): {} frames, {} chunks, {} bytes as {}",
            self.preset.id,
            pump.reason,
            pump.frames_drawn,
            output.chunk_count,
            output.bytes.len(),
            output.media_type
        );

        Ok(JobOutput {
            artifact: Artifact::new(output.bytes, output.media_type, self.preset),
            termination: pump.reason,
            frames_drawn: pump.frames_drawn,
            chunk_count: output.chunk_count,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn render<F>(
        &self,
        source: &dyn PlaybackSource,
        canvas_track: &mut dyn CanvasTrack,
        stream: &MediaStream,
        feed: Option<&AudioFeed>,
        target: RenderTarget,
        metadata: SourceMetadata,
        report: &mut F,
    ) -> Result<(EncodedOutput, PumpReport), ExportError>
    where
        F: FnMut(PipelineUpdate) + Send,
    {
        let mut session =
            EncoderSession::open(self.backend.as_ref(), stream, &self.config.mime_candidates)?;

        // Play from zero; the decoder keeps producing audio at volume 0
        source.pause();
        source.seek(0.0);
        source.set_muted(false);
        source.set_volume(0.0);

        let termination = Termination::new();
        let pump = FramePump::new(
            source,
            canvas_track,
            FrameCanvas::new(target.width, target.height),
            PumpMode::for_source(source, &self.config),
            termination.clone(),
        );

        session.start(self.config.chunk_interval())?;
        report(PipelineUpdate::Stage(JobState::Rendering));

        let duration = metadata.known_duration();
        let _timer = SafetyTimer::spawn(termination, safety_timeout(duration, &self.config));

        if let Err(e) = source.play().await {
            session.abort().await;
            return Err(ExportError::SourceFailed(e.to_string()));
        }
        if let Some(feed) = feed {
            feed.start().await;
        }

        let pump_report = pump
            .run(|progress| report(PipelineUpdate::Progress(progress)))
            .await;

        report(PipelineUpdate::Stage(JobState::Finalizing));
        if duration.is_some() {
            report(PipelineUpdate::Progress(1.0));
        }
        source.pause();

        let output = session.finish().await?;
        Ok((output, pump_report))
    }
}

/// Wait until the source reports metadata
///
/// Forces a reload when nothing is loaded yet. A playback error while waiting
/// fails with [`ExportError::SourceFailed`]; no metadata within `timeout`
/// fails with [`ExportError::MetadataTimeout`].
pub async fn wait_for_metadata(
    source: &dyn PlaybackSource,
    timeout: Duration,
) -> Result<SourceMetadata, ExportError> {
    if let Some(metadata) = source.metadata() {
        return Ok(metadata);
    }

    let mut events = source.subscribe();
    source.reload();
    tracing::debug!("Waiting up to {}ms for source metadata", timeout.as_millis());

    let wait = async {
        loop {
            match events.recv().await {
                Ok(PlaybackEvent::MetadataLoaded) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(metadata) = source.metadata() {
                        return Ok(metadata);
                    }
                }
                Ok(PlaybackEvent::Error(message)) => return Err(ExportError::SourceFailed(message)),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ExportError::SourceFailed(
                        "Playback source closed".to_string(),
                    ))
                }
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(ExportError::MetadataTimeout(timeout.as_millis() as u64)),
    }
}
