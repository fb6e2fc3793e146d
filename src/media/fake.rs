//! In-memory collaborators for tests
//!
//! A playback source that "plays" on the tokio clock, plus a backend whose
//! canvas tracks, audio graphs and encoders record what was done to them.

use super::mime::DEFAULT_CANDIDATES;
use super::traits::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        !self.is_stopped()
    }
}

/// How the fake source reports metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetadataMode {
    Ready,
    OnReload,
    Never,
    ErrorOnReload,
}

/// What `capture_stream` does
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureMode {
    Unsupported,
    Fails,
    NoAudio,
    Audio,
}

#[derive(Debug)]
struct SourceState {
    loaded: bool,
    position: f64,
    playing_since: Option<Instant>,
    muted: bool,
    volume: f64,
}

pub struct FakeSource {
    reported_duration: Option<f64>,
    length_secs: f64,
    width: u32,
    height: u32,
    metadata_mode: MetadataMode,
    emits_end: bool,
    frame_callbacks: bool,
    capture: CaptureMode,
    play_error: Option<String>,
    fail_frames: AtomicBool,
    capture_track: Arc<FakeTrack>,
    state: Mutex<SourceState>,
    generation: Arc<AtomicU64>,
    events: broadcast::Sender<PlaybackEvent>,
    pub plays: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            reported_duration: Some(2.0),
            length_secs: 2.0,
            width: 64,
            height: 36,
            metadata_mode: MetadataMode::Ready,
            emits_end: true,
            frame_callbacks: true,
            capture: CaptureMode::Audio,
            play_error: None,
            fail_frames: AtomicBool::new(false),
            capture_track: FakeTrack::new("element-capture-audio", TrackKind::Audio),
            state: Mutex::new(SourceState {
                loaded: true,
                position: 0.0,
                playing_since: None,
                muted: false,
                volume: 1.0,
            }),
            generation: Arc::new(AtomicU64::new(0)),
            events,
            plays: AtomicUsize::new(0),
        }
    }

    /// Reported duration; also the real media length when known
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.reported_duration = duration;
        if let Some(d) = duration {
            self.length_secs = d;
        }
        self
    }

    pub fn with_length(mut self, secs: f64) -> Self {
        self.length_secs = secs;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_metadata(mut self, mode: MetadataMode) -> Self {
        self.metadata_mode = mode;
        self.state.get_mut().loaded = mode == MetadataMode::Ready;
        self
    }

    pub fn without_end_event(mut self) -> Self {
        self.emits_end = false;
        self
    }

    pub fn without_frame_callbacks(mut self) -> Self {
        self.frame_callbacks = false;
        self
    }

    pub fn with_capture(mut self, mode: CaptureMode) -> Self {
        self.capture = mode;
        self
    }

    pub fn with_play_error(mut self, message: &str) -> Self {
        self.play_error = Some(message.to_string());
        self
    }

    pub fn fail_frames(&self, fail: bool) {
        self.fail_frames.store(fail, Ordering::SeqCst);
    }

    pub fn capture_track(&self) -> &Arc<FakeTrack> {
        &self.capture_track
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing_since.is_some()
    }

    pub fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl PlaybackSource for FakeSource {
    fn metadata(&self) -> Option<SourceMetadata> {
        self.state.lock().loaded.then_some(SourceMetadata {
            duration_secs: self.reported_duration,
            width: self.width,
            height: self.height,
        })
    }

    fn reload(&self) {
        match self.metadata_mode {
            MetadataMode::Ready | MetadataMode::OnReload => {
                self.state.lock().loaded = true;
                self.emit(PlaybackEvent::MetadataLoaded);
            }
            MetadataMode::ErrorOnReload => {
                self.emit(PlaybackEvent::Error("decode failed".to_string()));
            }
            MetadataMode::Never => {}
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    async fn play(&self) -> Result<(), MediaError> {
        if let Some(message) = &self.play_error {
            return Err(MediaError::Playback(message.clone()));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);

        let start_position = {
            let mut state = self.state.lock();
            state.playing_since = Some(Instant::now());
            state.position
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let generation_ref = self.generation.clone();
        let events = self.events.clone();
        let remaining = Duration::from_secs_f64((self.length_secs - start_position).max(0.0));
        let frame_callbacks = self.frame_callbacks;
        let emits_end = self.emits_end;
        tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::time::sleep(FRAME_INTERVAL).await;
                if generation_ref.load(Ordering::SeqCst) != generation {
                    return;
                }
                if started.elapsed() >= remaining {
                    if emits_end {
                        let _ = events.send(PlaybackEvent::Ended);
                    }
                    return;
                }
                if frame_callbacks {
                    let _ = events.send(PlaybackEvent::FrameReady);
                }
            }
        });
        Ok(())
    }

    fn pause(&self) {
        let position = self.position();
        let mut state = self.state.lock();
        state.position = position;
        state.playing_since = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn position(&self) -> f64 {
        let state = self.state.lock();
        match state.playing_since {
            Some(since) => (state.position + since.elapsed().as_secs_f64()).min(self.length_secs),
            None => state.position,
        }
    }

    fn seek(&self, position_secs: f64) {
        let mut state = self.state.lock();
        state.position = position_secs;
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
    }

    fn muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn supports_frame_callbacks(&self) -> bool {
        self.frame_callbacks
    }

    fn supports_capture(&self) -> bool {
        self.capture != CaptureMode::Unsupported
    }

    fn capture_stream(&self) -> Result<MediaStream, MediaError> {
        let mut stream = MediaStream::new();
        match self.capture {
            CaptureMode::Unsupported => {
                return Err(MediaError::Unavailable("captureStream".to_string()))
            }
            CaptureMode::Fails => return Err(MediaError::Playback("capture threw".to_string())),
            CaptureMode::NoAudio => {}
            CaptureMode::Audio => stream.add_track(self.capture_track.clone()),
        }
        stream.add_track(FakeTrack::new("element-capture-video", TrackKind::Video));
        Ok(stream)
    }

    fn current_frame(&self) -> Result<VideoFrame, MediaError> {
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(MediaError::Draw("seeking".to_string()));
        }
        let pixels = (self.width * self.height) as usize;
        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            data: [200u8, 10, 10, 255].repeat(pixels),
        })
    }
}

/// How the fake backend's audio graphs behave
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphMode {
    Works,
    OpenFails,
    NoTrack,
}

/// Everything the fake backend observed
#[derive(Debug, Default)]
pub struct BackendStats {
    pub graphs_opened: AtomicUsize,
    pub graphs_closed: AtomicUsize,
    pub graphs_started: AtomicUsize,
    pub graph_tracks: Mutex<Vec<Arc<FakeTrack>>>,
    pub monitor_gains: Mutex<Vec<f32>>,
    pub canvas_tracks: Mutex<Vec<Arc<FakeTrack>>>,
    pub canvas_sizes: Mutex<Vec<(u32, u32, u32)>>,
    pub frames_submitted: AtomicUsize,
    pub submitted_frame_sizes: Mutex<Vec<(u32, u32)>>,
    pub encoders_started: AtomicUsize,
    pub encoders_stopped: AtomicUsize,
    /// (video tracks, audio tracks, requested type) per encoder
    pub encoder_streams: Mutex<Vec<(usize, usize, String)>>,
}

pub struct FakeBackend {
    supported: Vec<String>,
    substitute_type: Option<String>,
    graph_mode: GraphMode,
    encoder_stop_error: Option<String>,
    pub stats: Arc<BackendStats>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            supported: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            substitute_type: None,
            graph_mode: GraphMode::Works,
            encoder_stop_error: None,
            stats: Arc::new(BackendStats::default()),
        }
    }

    pub fn with_supported(mut self, types: &[&str]) -> Self {
        self.supported = types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Encoders report this type instead of the requested one
    pub fn with_substitute_type(mut self, media_type: &str) -> Self {
        self.substitute_type = Some(media_type.to_string());
        self
    }

    pub fn with_graph(mut self, mode: GraphMode) -> Self {
        self.graph_mode = mode;
        self
    }

    pub fn with_encoder_stop_error(mut self, message: &str) -> Self {
        self.encoder_stop_error = Some(message.to_string());
        self
    }
}

struct FakeCanvasTrack {
    track: Arc<FakeTrack>,
    stats: Arc<BackendStats>,
}

impl CanvasTrack for FakeCanvasTrack {
    fn track(&self) -> TrackHandle {
        self.track.clone()
    }

    fn submit(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), MediaError> {
        if self.track.is_stopped() {
            return Err(MediaError::Draw("track stopped".to_string()));
        }
        if rgba.len() != (width as usize) * (height as usize) * 4 {
            return Err(MediaError::Draw(format!(
                "{} bytes for a {}x{} frame",
                rgba.len(),
                width,
                height
            )));
        }
        self.stats.submitted_frame_sizes.lock().push((width, height));
        self.stats.frames_submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeGraph {
    track: Option<Arc<FakeTrack>>,
    suspended: AtomicBool,
    stats: Arc<BackendStats>,
}

#[async_trait]
impl AudioGraph for FakeGraph {
    fn capture_track(&self) -> Option<TrackHandle> {
        self.track.clone().map(|t| t as TrackHandle)
    }

    fn set_monitor_gain(&self, gain: f32) {
        self.stats.monitor_gains.lock().push(gain);
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), MediaError> {
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<(), MediaError> {
        self.stats.graphs_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {}

    async fn close(&self) -> Result<(), MediaError> {
        self.stats.graphs_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeEncoder {
    media_type: String,
    running: Arc<AtomicBool>,
    sink: Option<mpsc::UnboundedSender<Vec<u8>>>,
    stop_error: Option<String>,
    stats: Arc<BackendStats>,
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    fn start(
        &mut self,
        timeslice: Duration,
        sink: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<(), MediaError> {
        self.stats.encoders_started.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let ticker_sink = sink.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeslice).await;
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                // Empty flushes happen on real encoders too
                let _ = ticker_sink.send(Vec::new());
                let _ = ticker_sink.send(b"c".to_vec());
            }
        });
        self.sink = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        self.running.store(false, Ordering::SeqCst);
        self.stats.encoders_stopped.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.stop_error {
            return Err(MediaError::Encoder(message.clone()));
        }
        if let Some(sink) = self.sink.take() {
            let frames = self.stats.frames_submitted.load(Ordering::SeqCst);
            let _ = sink.send(format!("|frames={}", frames).into_bytes());
        }
        Ok(())
    }

    fn media_type(&self) -> String {
        self.media_type.clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn is_type_supported(&self, media_type: &str) -> bool {
        self.supported.iter().any(|s| s == media_type)
    }

    fn create_canvas_track(
        &self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn CanvasTrack>, MediaError> {
        let track = FakeTrack::new("canvas-video", TrackKind::Video);
        self.stats.canvas_tracks.lock().push(track.clone());
        self.stats.canvas_sizes.lock().push((width, height, fps));
        Ok(Box::new(FakeCanvasTrack {
            track,
            stats: self.stats.clone(),
        }))
    }

    async fn open_audio_graph(
        &self,
        _payload: Arc<[u8]>,
        _media_type: &str,
    ) -> Result<Box<dyn AudioGraph>, MediaError> {
        if self.graph_mode == GraphMode::OpenFails {
            return Err(MediaError::AudioGraph("no audio context".to_string()));
        }
        self.stats.graphs_opened.fetch_add(1, Ordering::SeqCst);
        let track = (self.graph_mode == GraphMode::Works)
            .then(|| FakeTrack::new("graph-capture-audio", TrackKind::Audio));
        if let Some(track) = &track {
            self.stats.graph_tracks.lock().push(track.clone());
        }
        Ok(Box::new(FakeGraph {
            track,
            suspended: AtomicBool::new(true),
            stats: self.stats.clone(),
        }))
    }

    fn create_encoder(
        &self,
        stream: &MediaStream,
        media_type: &str,
    ) -> Result<Box<dyn MediaEncoder>, MediaError> {
        self.stats.encoder_streams.lock().push((
            stream.video_tracks().count(),
            stream.audio_tracks().count(),
            media_type.to_string(),
        ));
        Ok(Box::new(FakeEncoder {
            media_type: self
                .substitute_type
                .clone()
                .unwrap_or_else(|| media_type.to_string()),
            running: Arc::new(AtomicBool::new(false)),
            sink: None,
            stop_error: self.encoder_stop_error.clone(),
            stats: self.stats.clone(),
        }))
    }
}
