//! Playback-driven frame pump
//!
//! Renders the playing source into the target buffer, one draw per decoded
//! frame when the source can notify per frame, or on a fixed timer when it
//! cannot. The pump ends on end-of-stream or when the safety timeout fires;
//! both race on one [`Termination`] token and only the first one counts.

use crate::config::ExportConfig;
use crate::export::canvas::FrameCanvas;
use crate::export::types::TerminationReason;
use crate::media::{CanvasTrack, PlaybackEvent, PlaybackSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// How the pump paces its draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpMode {
    /// Draw once per decoded-frame notification
    FrameCallback,
    /// Draw on every tick of a fixed-rate timer
    Polling(Duration),
}

impl PumpMode {
    /// Per-frame notifications when the source has them, polling otherwise
    pub fn for_source(source: &dyn PlaybackSource, config: &ExportConfig) -> Self {
        if source.supports_frame_callbacks() {
            PumpMode::FrameCallback
        } else {
            PumpMode::Polling(config.poll_interval())
        }
    }
}

struct TerminationInner {
    reason: Mutex<Option<TerminationReason>>,
    notify: Notify,
}

/// One-shot termination token shared by the pump and the safety timer
#[derive(Clone)]
pub struct Termination {
    inner: Arc<TerminationInner>,
}

impl Default for Termination {
    fn default() -> Self {
        Self::new()
    }
}

impl Termination {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TerminationInner {
                reason: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Terminate with `reason`. Returns false if already terminated.
    pub fn fire(&self, reason: TerminationReason) -> bool {
        {
            let mut current = self.inner.reason.lock();
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        *self.inner.reason.lock()
    }

    pub fn is_fired(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the token fires
    pub async fn fired(&self) -> TerminationReason {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

/// Safety timeout for a source of the given duration
///
/// `max(min, ceil(duration * 1000) + margin)` in milliseconds; an unknown
/// duration counts as zero.
pub fn safety_timeout(duration_secs: Option<f64>, config: &ExportConfig) -> Duration {
    let duration_ms = duration_secs
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| (d * 1000.0).ceil() as u64)
        .unwrap_or(0);
    Duration::from_millis(
        config
            .min_safety_timeout_ms
            .max(duration_ms + config.safety_margin_ms),
    )
}

/// Aborts the safety timer task when dropped
pub struct SafetyTimer {
    handle: JoinHandle<()>,
}

impl SafetyTimer {
    /// Fire `termination` with [`TerminationReason::SafetyTimeout`] after `timeout`
    pub fn spawn(termination: Termination, timeout: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if termination.fire(TerminationReason::SafetyTimeout) {
                tracing::warn!(
                    "End of stream not reported within {}ms, stopping export",
                    timeout.as_millis()
                );
            }
        });
        Self { handle }
    }
}

impl Drop for SafetyTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Summary of one pump run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpReport {
    pub reason: TerminationReason,
    pub frames_drawn: u64,
    pub frames_skipped: u64,
    /// Last progress value reported
    pub progress: f64,
}

/// Draws the playing source into a canvas track until terminated
pub struct FramePump<'a> {
    source: &'a dyn PlaybackSource,
    sink: &'a mut dyn CanvasTrack,
    canvas: FrameCanvas,
    mode: PumpMode,
    termination: Termination,
    events: broadcast::Receiver<PlaybackEvent>,
    frames_drawn: u64,
    frames_skipped: u64,
    progress: f64,
}

impl<'a> FramePump<'a> {
    /// Create a pump. It subscribes to the source immediately so no
    /// notification sent after construction is missed.
    pub fn new(
        source: &'a dyn PlaybackSource,
        sink: &'a mut dyn CanvasTrack,
        canvas: FrameCanvas,
        mode: PumpMode,
        termination: Termination,
    ) -> Self {
        let events = source.subscribe();
        Self {
            source,
            sink,
            canvas,
            mode,
            termination,
            events,
            frames_drawn: 0,
            frames_skipped: 0,
            progress: 0.0,
        }
    }

    /// Run until the termination token fires
    ///
    /// `on_progress` receives non-decreasing values in [0, 1] and is never
    /// called after termination.
    pub async fn run<F>(mut self, mut on_progress: F) -> PumpReport
    where
        F: FnMut(f64) + Send,
    {
        tracing::debug!("Frame pump started in {:?} mode", self.mode);

        let mut ticker = match self.mode {
            PumpMode::Polling(period) => Some(tokio::time::interval(period)),
            PumpMode::FrameCallback => None,
        };
        let termination = self.termination.clone();

        let reason = loop {
            tokio::select! {
                biased;

                reason = termination.fired() => break reason,

                event = self.events.recv() => match event {
                    Ok(PlaybackEvent::Ended) => {
                        if termination.fire(TerminationReason::EndOfStream) {
                            tracing::debug!("Source reported end of stream");
                        }
                    }
                    Ok(PlaybackEvent::FrameReady) if self.mode == PumpMode::FrameCallback => {
                        self.draw(&mut on_progress);
                    }
                    Ok(PlaybackEvent::Error(message)) => {
                        tracing::warn!("Playback error during export: {}", message);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!("Frame pump lagged, {} notifications dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Source went away; nothing more will arrive
                        termination.fire(TerminationReason::EndOfStream);
                    }
                },

                _ = next_tick(&mut ticker) => {
                    self.draw(&mut on_progress);
                }
            }
        };

        tracing::debug!(
            "Frame pump stopped ({:?}): {} frames drawn, {} skipped",
            reason,
            self.frames_drawn,
            self.frames_skipped
        );

        PumpReport {
            reason,
            frames_drawn: self.frames_drawn,
            frames_skipped: self.frames_skipped,
            progress: self.progress,
        }
    }

    /// Draw the current source frame and report progress
    ///
    /// Frame errors (typically mid-seek) skip this draw.
    fn draw<F: FnMut(f64)>(&mut self, on_progress: &mut F) {
        if self.termination.is_fired() {
            return;
        }

        let frame = match self.source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.frames_skipped += 1;
                tracing::trace!("Skipping draw: {}", e);
                return;
            }
        };

        // Geometry is resolved per frame; the source size can change mid-stream
        if let Err(e) = self.canvas.draw_contain(&frame) {
            self.frames_skipped += 1;
            tracing::trace!("Skipping draw: {}", e);
            return;
        }

        let canvas = &self.canvas;
        if let Err(e) = self.sink.submit(canvas.width(), canvas.height(), canvas.data()) {
            self.frames_skipped += 1;
            tracing::warn!("Failed to submit frame: {}", e);
            return;
        }
        self.frames_drawn += 1;

        let progress = current_progress(self.source).max(self.progress);
        self.progress = progress;
        on_progress(progress);
    }
}

/// position / duration clamped to [0, 1]; 0 while duration is unknown
pub fn current_progress(source: &dyn PlaybackSource) -> f64 {
    match source.metadata().and_then(|m| m.known_duration()) {
        Some(duration) => (source.position() / duration).clamp(0.0, 1.0),
        None => 0.0,
    }
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
