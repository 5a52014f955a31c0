//! Sync-channel extraction, visualization export, and suppression.
//!
//! The sync channel carries a synchronization signal rather than neural data,
//! so it is handled outside the main preprocessing chain. Silencing is
//! channel-local: it commutes with any step that neither reads nor writes the
//! sync channel, which holds for every builtin step. If a custom step is
//! channel-order dependent, the caller sequences `silence` explicitly.

use crate::paths::OutputPathManager;
use ephys_types::{Recording, Run};
use std::path::PathBuf;
use std::sync::Arc;

/// Errors scoped to sync-channel operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Run {run} has no channel flagged as sync")]
    SyncChannelNotFound { run: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Operates on the same raw recording handles as the pipeline, independently
/// invocable before, after, or without it.
#[derive(Debug, Clone)]
pub struct SyncChannelService {
    paths: OutputPathManager,
}

impl SyncChannelService {
    pub fn new(paths: OutputPathManager) -> Self {
        Self { paths }
    }

    /// Returns the sync channel's samples.
    pub fn extract<'a>(
        &self,
        run: &Run,
        recording: &'a Recording,
    ) -> Result<&'a [f32], SyncError> {
        let index = recording
            .sync_channel()
            .ok_or_else(|| SyncError::SyncChannelNotFound {
                run: run.to_string(),
            })?;
        Ok(&recording.samples[index])
    }

    /// Writes the sync channel's trace as a CSV artifact under the run's sync
    /// directory and returns its path. The recording is not mutated.
    pub fn export_trace(&self, run: &Run, recording: &Recording) -> Result<PathBuf, SyncError> {
        let samples = self.extract(run, recording)?;
        let dir = self.paths.prepare(&self.paths.sync_dir(run))?;
        let path = dir.join("sync_channel.csv");

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["sample_index", "value"])?;
        for (i, value) in samples.iter().enumerate() {
            writer.write_record([i.to_string(), value.to_string()])?;
        }
        writer.flush()?;

        tracing::info!(run = %run, path = %path.display(), "Exported sync channel trace");
        Ok(path)
    }

    /// Returns a new recording with the sync channel zeroed. Every other
    /// channel and all metadata are unchanged.
    pub fn silence(&self, run: &Run, recording: Recording) -> Result<Recording, SyncError> {
        let index = recording
            .sync_channel()
            .ok_or_else(|| SyncError::SyncChannelNotFound {
                run: run.to_string(),
            })?;

        let mut samples = recording.samples;
        for value in &mut samples[index] {
            *value = 0.0;
        }

        tracing::info!(run = %run, channel = index, "Silenced sync channel");
        Ok(Recording {
            meta: Arc::clone(&recording.meta),
            samples,
        })
    }
}
