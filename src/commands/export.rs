//! Export command handlers
//!
//! The export job controller: one job state per preset, at most one active
//! job at a time, finished artifacts kept per preset. Jobs run in background
//! tasks and report through job status and [`ExportEvent`]s.

use crate::config::{AppConfig, ExportConfig};
use crate::export::{
    Artifact, ArtifactRegistry, AudioRouteSelector, ExportError, ExportEvent, ExportPipeline,
    ExportPreset, JobState, JobStatus, PipelineUpdate, SharedSource, SourceGuard,
    ORIGINAL_PRESET_ID,
};
use crate::media::MediaBackend;
use crate::recorder::Recording;
use crate::utils::{AppResult, ErrorResponse};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// Outcome of an accepted export request
#[derive(Debug, Clone)]
pub enum ExportRequest {
    /// A job was started; follow it through [`ExportController::job_status`]
    Scheduled,
    /// The original preset is served immediately
    Original(Artifact),
}

struct ActiveRecording {
    recording: Recording,
    source: SharedSource,
}

struct ControllerInner {
    backend: Arc<dyn MediaBackend>,
    config: ExportConfig,
    selector: Arc<AudioRouteSelector>,
    session: RwLock<Option<ActiveRecording>>,
    jobs: RwLock<HashMap<&'static str, JobStatus>>,
    artifacts: RwLock<ArtifactRegistry>,
    event_tx: broadcast::Sender<ExportEvent>,
}

/// Export job controller
#[derive(Clone)]
pub struct ExportController {
    inner: Arc<ControllerInner>,
}

impl ExportController {
    pub fn new(backend: Arc<dyn MediaBackend>, config: ExportConfig) -> Self {
        Self::with_audio_selector(backend, config, AudioRouteSelector::default())
    }

    pub fn with_audio_selector(
        backend: Arc<dyn MediaBackend>,
        config: ExportConfig,
        selector: AudioRouteSelector,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                backend,
                config,
                selector: Arc::new(selector),
                session: RwLock::new(None),
                jobs: RwLock::new(HashMap::new()),
                artifacts: RwLock::new(ArtifactRegistry::new()),
                event_tx,
            }),
        }
    }

    /// Build a controller from a JSON config file
    pub fn from_config_file(backend: Arc<dyn MediaBackend>, path: &Path) -> AppResult<Self> {
        let config = AppConfig::load_from(path)?;
        Ok(Self::new(backend, config.export))
    }

    /// The fixed preset table
    pub fn presets() -> &'static [ExportPreset] {
        ExportPreset::all()
    }

    /// Make `recording` the export source
    ///
    /// Refused while a job is active. Clears all artifacts and job states.
    pub fn set_recording(&self, recording: Recording) -> Result<(), ExportError> {
        if self.is_exporting() {
            return Err(ExportError::RecordingBusy);
        }

        tracing::info!(
            "Export source set to recording {} ({} bytes, {})",
            recording.id(),
            recording.size(),
            recording.media_type()
        );
        let source = SharedSource::new(recording.playback().clone());
        *self.inner.session.write() = Some(ActiveRecording { recording, source });
        self.inner.artifacts.write().clear();
        self.inner.jobs.write().clear();
        Ok(())
    }

    pub fn recording(&self) -> Option<Recording> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| s.recording.clone())
    }

    /// Request an export for `preset_id`
    ///
    /// Must be called from within a tokio runtime. The original preset is
    /// answered immediately and never touches the source or the job table.
    /// Every other rejection is also recorded as a failed job, but only for a
    /// preset that is still Idle; an active, complete or failed job keeps its
    /// state and artifact.
    pub fn request_export(&self, preset_id: &str) -> Result<ExportRequest, ExportError> {
        let preset =
            ExportPreset::find(preset_id).ok_or_else(|| ExportError::UnknownPreset(preset_id.to_string()))?;

        if preset.is_original() {
            return self.download_original().map(ExportRequest::Original);
        }

        let (recording, guard) = match self.acquire_source() {
            Ok(acquired) => acquired,
            Err(e) => {
                // Only a preset with no job yet records the rejection
                if self.job_status(preset.id).state == JobState::Idle {
                    self.inner.fail(preset.id, &e, None);
                }
                return Err(e);
            }
        };

        self.inner.jobs.write().insert(preset.id, JobStatus::preparing());
        self.inner.emit(ExportEvent::StateChanged {
            preset_id: preset.id,
            state: JobState::Preparing,
        });
        tracing::info!("Export {} accepted", preset.id);

        let pipeline = ExportPipeline::new(
            recording,
            preset,
            self.inner.backend.clone(),
            self.inner.config.clone(),
            self.inner.selector.clone(),
        );
        tokio::spawn(run_job(self.inner.clone(), preset, pipeline, guard));

        Ok(ExportRequest::Scheduled)
    }

    fn acquire_source(&self) -> Result<(Recording, SourceGuard), ExportError> {
        let session = self.inner.session.read();
        let active = session.as_ref().ok_or(ExportError::NoSourceRecording)?;
        let guard = active.source.try_acquire()?;
        Ok((active.recording.clone(), guard))
    }

    /// Current state of the preset's job; Idle if it never ran
    pub fn job_status(&self, preset_id: &str) -> JobStatus {
        self.inner
            .jobs
            .read()
            .get(preset_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored artifact for the preset, if its last job completed
    pub fn artifact(&self, preset_id: &str) -> Option<Arc<Artifact>> {
        self.inner.artifacts.read().get(preset_id)
    }

    pub fn artifact_count(&self) -> usize {
        self.inner.artifacts.read().len()
    }

    /// The recording's own bytes, untouched
    pub fn download_original(&self) -> Result<Artifact, ExportError> {
        let recording = self.recording().ok_or(ExportError::NoSourceRecording)?;
        let preset = ExportPreset::find(ORIGINAL_PRESET_ID).ok_or_else(|| {
            ExportError::UnknownPreset(ORIGINAL_PRESET_ID.to_string())
        })?;
        Ok(Artifact::new(
            recording.payload().clone(),
            recording.media_type(),
            preset,
        ))
    }

    /// Drop the recording and every artifact made from it
    ///
    /// Refused with [`ExportError::RecordingBusy`] while a job is active.
    pub fn delete_recording(&self) -> Result<(), ExportError> {
        if self.is_exporting() {
            tracing::warn!("Refusing to delete recording during an export");
            return Err(ExportError::RecordingBusy);
        }

        if let Some(active) = self.inner.session.write().take() {
            tracing::info!("Deleted recording {}", active.recording.id());
        }
        self.inner.artifacts.write().clear();
        self.inner.jobs.write().clear();
        Ok(())
    }

    /// Whether any job holds the source
    pub fn is_exporting(&self) -> bool {
        let locked = self
            .inner
            .session
            .read()
            .as_ref()
            .is_some_and(|s| s.source.is_locked());
        locked || self.inner.jobs.read().values().any(|s| s.state.is_active())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.inner.event_tx.subscribe()
    }
}

impl ControllerInner {
    fn emit(&self, event: ExportEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn apply_update(&self, preset_id: &'static str, update: PipelineUpdate) {
        let event = {
            let mut jobs = self.jobs.write();
            let status = jobs.entry(preset_id).or_default();
            match update {
                PipelineUpdate::Stage(state) => {
                    tracing::info!("Export {}: {:?} -> {:?}", preset_id, status.state, state);
                    status.state = state;
                    ExportEvent::StateChanged { preset_id, state }
                }
                PipelineUpdate::Progress(progress) => {
                    let progress = progress.clamp(0.0, 1.0);
                    if progress <= status.progress {
                        return;
                    }
                    status.progress = progress;
                    ExportEvent::Progress { preset_id, progress }
                }
                PipelineUpdate::Warning(message) => {
                    status.warnings.push(message.clone());
                    ExportEvent::Warning { preset_id, message }
                }
            }
        };
        self.emit(event);
    }

    /// Store the artifact, then mark the job complete and release the
    /// source in one step
    fn complete(&self, preset_id: &'static str, artifact: Artifact, guard: SourceGuard) {
        let media_type = artifact.media_type.clone();
        let size = artifact.size();
        let previous = self.artifacts.write().insert(preset_id, Arc::new(artifact));
        drop(previous);

        {
            let mut jobs = self.jobs.write();
            jobs.entry(preset_id).or_default().state = JobState::Complete;
            drop(guard);
        }
        self.emit(ExportEvent::Completed {
            preset_id,
            media_type,
            size,
        });
    }

    /// Mark the job failed, releasing the source in the same step if held
    fn fail(&self, preset_id: &'static str, error: &ExportError, guard: Option<SourceGuard>) {
        {
            let mut jobs = self.jobs.write();
            let status = jobs.entry(preset_id).or_default();
            status.state = JobState::Failed;
            status.failure_reason = Some(ErrorResponse::from(error));
            drop(guard);
        }
        self.emit(ExportEvent::Failed {
            preset_id,
            error: error.clone(),
        });
    }
}

async fn run_job(
    inner: Arc<ControllerInner>,
    preset: &'static ExportPreset,
    pipeline: ExportPipeline,
    guard: SourceGuard,
) {
    let updates = inner.clone();
    let result = pipeline
        .run(&guard, move |update| updates.apply_update(preset.id, update))
        .await;

    // Owned resources are released and playback restored by now; the source
    // lock goes with the terminal state
    match result {
        Ok(output) => {
            tracing::info!(
                "Export {} complete: {} ({})",
                preset.id,
                output.artifact.file_name,
                output.artifact.pretty_size()
            );
            inner.complete(preset.id, output.artifact, guard);
        }
        Err(e) => {
            tracing::error!("Export {} failed: {}", preset.id, e);
            inner.fail(preset.id, &e, Some(guard));
        }
    }
}
