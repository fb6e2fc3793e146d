//! Export types and configuration
//!
//! This module defines the presets, job state machine, progress reporting,
//! artifacts and errors used by the export pipeline.

use crate::media::{extension_for, pretty_bytes, FALLBACK_MEDIA_TYPE};
use crate::utils::error::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of the pass-through preset
pub const ORIGINAL_PRESET_ID: &str = "orig";

/// A fixed export variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPreset {
    pub id: &'static str,
    pub label: &'static str,
    /// Output width in pixels (None = use source resolution)
    pub width: Option<u32>,
    /// Output height in pixels (None = use source resolution)
    pub height: Option<u32>,
    /// Output frame rate (None = default fps)
    pub fps: Option<u32>,
}

/// The preset table
pub const PRESETS: [ExportPreset; 5] = [
    ExportPreset {
        id: ORIGINAL_PRESET_ID,
        label: "Original",
        width: None,
        height: None,
        fps: None,
    },
    ExportPreset {
        id: "1080p30",
        label: "1080p / 30 FPS",
        width: Some(1920),
        height: Some(1080),
        fps: Some(30),
    },
    ExportPreset {
        id: "720p30",
        label: "720p / 30 FPS",
        width: Some(1280),
        height: Some(720),
        fps: Some(30),
    },
    ExportPreset {
        id: "720p60",
        label: "720p / 60 FPS",
        width: Some(1280),
        height: Some(720),
        fps: Some(60),
    },
    ExportPreset {
        id: "480p30",
        label: "480p / 30 FPS",
        width: Some(854),
        height: Some(480),
        fps: Some(30),
    },
];

impl ExportPreset {
    pub fn find(id: &str) -> Option<&'static ExportPreset> {
        PRESETS.iter().find(|p| p.id == id)
    }

    pub fn all() -> &'static [ExportPreset] {
        &PRESETS
    }

    /// The original preset is a straight copy of the recording
    pub fn is_original(&self) -> bool {
        self.id == ORIGINAL_PRESET_ID
    }

    /// Suggested download file name for an artifact of this preset
    pub fn file_name(&self, media_type: &str) -> String {
        let key = if self.is_original() { "original" } else { self.id };
        format!("recording-{}.{}", key, extension_for(media_type))
    }
}

/// Export job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// No job has run (or the recording was replaced)
    #[default]
    Idle,
    /// Waiting for source metadata and building the pipeline
    Preparing,
    /// Playing the source and encoding frames
    Rendering,
    /// Stopping the encoder and collecting its output
    Finalizing,
    /// Artifact stored
    Complete,
    /// Job failed with a recorded reason
    Failed,
}

impl JobState {
    /// Whether the job holds the shared source
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Preparing | JobState::Rendering | JobState::Finalizing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// Snapshot of a job as seen by the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    /// Progress fraction (0.0 to 1.0)
    pub progress: f64,
    /// Reason for a failed job
    pub failure_reason: Option<ErrorResponse>,
    /// Non-fatal problems, e.g. a video-only fallback
    pub warnings: Vec<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::idle()
    }
}

impl JobStatus {
    pub fn idle() -> Self {
        Self {
            state: JobState::Idle,
            progress: 0.0,
            failure_reason: None,
            warnings: Vec::new(),
        }
    }

    pub fn preparing() -> Self {
        Self {
            state: JobState::Preparing,
            ..Self::idle()
        }
    }

    pub fn failed(error: &ExportError) -> Self {
        Self {
            state: JobState::Failed,
            failure_reason: Some(ErrorResponse::from(error)),
            ..Self::idle()
        }
    }
}

/// Why the frame pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    /// The source reported end of stream
    EndOfStream,
    /// The safety timeout fired first
    SafetyTimeout,
}

/// Updates reported by a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineUpdate {
    Stage(JobState),
    Progress(f64),
    Warning(String),
}

/// Events broadcast by the export controller
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    StateChanged {
        preset_id: &'static str,
        state: JobState,
    },
    Progress {
        preset_id: &'static str,
        progress: f64,
    },
    Warning {
        preset_id: &'static str,
        message: String,
    },
    Completed {
        preset_id: &'static str,
        media_type: String,
        size: usize,
    },
    Failed {
        preset_id: &'static str,
        error: ExportError,
    },
}

/// A finished export held in memory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: Uuid,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub media_type: String,
    /// Suggested download file name
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>, preset: &ExportPreset) -> Self {
        let mut media_type = media_type.into();
        if media_type.is_empty() {
            media_type = FALLBACK_MEDIA_TYPE.to_string();
        }
        Self {
            id: Uuid::new_v4(),
            bytes: bytes.into(),
            file_name: preset.file_name(&media_type),
            media_type,
            created_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn pretty_size(&self) -> String {
        pretty_bytes(self.size())
    }
}

/// Export errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Playback source is busy with another export")]
    SourceBusy,

    #[error("Source metadata not ready after {0}ms")]
    MetadataTimeout(u64),

    #[error("No supported container/codec candidate")]
    UnsupportedFormat,

    #[error("Audio route failed: {0}")]
    AudioRouteFailed(String),

    #[error("Encoder error: {0}")]
    EncoderFault(String),

    #[error("No recording to export")]
    NoSourceRecording,

    #[error("Recording is in use by an active export")]
    RecordingBusy,

    #[error("Unknown export preset: {0}")]
    UnknownPreset(String),

    #[error("Playback source error: {0}")]
    SourceFailed(String),
}

impl ExportError {
    /// Stable code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::SourceBusy => "SOURCE_BUSY",
            ExportError::MetadataTimeout(_) => "METADATA_TIMEOUT",
            ExportError::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ExportError::AudioRouteFailed(_) => "AUDIO_ROUTE_FAILED",
            ExportError::EncoderFault(_) => "ENCODER_FAULT",
            ExportError::NoSourceRecording => "NO_SOURCE_RECORDING",
            ExportError::RecordingBusy => "RECORDING_BUSY",
            ExportError::UnknownPreset(_) => "UNKNOWN_PRESET",
            ExportError::SourceFailed(_) => "SOURCE_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table() {
        let ids: Vec<_> = PRESETS.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["orig", "1080p30", "720p30", "720p60", "480p30"]);

        let p = ExportPreset::find("720p60").unwrap();
        assert_eq!((p.width, p.height, p.fps), (Some(1280), Some(720), Some(60)));
        assert!(ExportPreset::find("orig").unwrap().is_original());
        assert!(ExportPreset::find("4k").is_none());
    }

    #[test]
    fn test_file_names() {
        let orig = ExportPreset::find("orig").unwrap();
        let p480 = ExportPreset::find("480p30").unwrap();
        assert_eq!(orig.file_name("video/mp4"), "recording-original.mp4");
        assert_eq!(p480.file_name("video/webm;codecs=vp9,opus"), "recording-480p30.webm");
    }

    #[test]
    fn test_job_state_classes() {
        assert!(!JobState::Idle.is_active());
        assert!(JobState::Preparing.is_active());
        assert!(JobState::Rendering.is_active());
        assert!(JobState::Finalizing.is_active());
        assert!(JobState::Complete.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Idle.is_terminal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ExportError::AudioRouteFailed("x".into()).code(), "AUDIO_ROUTE_FAILED");
        assert_eq!(ExportError::SourceBusy.code(), "SOURCE_BUSY");
        assert_eq!(ExportError::EncoderFault("x".into()).code(), "ENCODER_FAULT");
    }

    #[test]
    fn test_artifact_defaults_media_type() {
        let preset = ExportPreset::find("720p30").unwrap();
        let artifact = Artifact::new(vec![0u8; 2048], "", preset);
        assert_eq!(artifact.media_type, "video/webm");
        assert_eq!(artifact.file_name, "recording-720p30.webm");
        assert_eq!(artifact.pretty_size(), "2.0 KB");
    }

    #[test]
    fn test_failed_status_serializes_reason() {
        let status = JobStatus::failed(&ExportError::MetadataTimeout(6000));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["failureReason"]["code"], "METADATA_TIMEOUT");
    }
}
