//! Raw-recording loading behind a trait seam.
//!
//! Actual raw file formats are an external concern. The pipeline only needs
//! something that can turn a [`Run`] into a [`Recording`], so readers plug in
//! behind [`RecordingLoader`]. The JSON loader here is the development format
//! used by the test suite and the persisted output of the pipeline itself.

use ephys_types::{Recording, RecordingError, RecordingMeta, Run};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Errors raised while reading or writing recording data.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("No recording found for run {run} at {path}")]
    NotFound { run: String, path: String },
    #[error("Invalid recording for run {run}: {source}")]
    Invalid {
        run: String,
        #[source]
        source: RecordingError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Capability to load a run's raw data into memory.
pub trait RecordingLoader: Send + Sync {
    fn load(&self, run: &Run) -> Result<Recording, LoaderError>;
}

/// On-disk recording file: metadata plus channel-major samples.
#[derive(Debug, Serialize, Deserialize)]
struct RecordingFile {
    sample_rate: f32,
    channel_names: Vec<String>,
    #[serde(default)]
    sync_channel: Option<usize>,
    samples: Vec<Vec<f32>>,
}

/// File name expected inside a run directory (raw side) and written to the
/// output tree (processed side).
pub const RECORDING_FILE_NAME: &str = "recording.json";

/// Loads `recording.json` files from each run's raw directory.
#[derive(Debug, Default, Clone)]
pub struct JsonRecordingLoader;

impl RecordingLoader for JsonRecordingLoader {
    fn load(&self, run: &Run) -> Result<Recording, LoaderError> {
        let path = run.raw_path.join(RECORDING_FILE_NAME);
        if !path.is_file() {
            return Err(LoaderError::NotFound {
                run: run.to_string(),
                path: path.display().to_string(),
            });
        }
        let contents = fs::read_to_string(&path)?;
        let file: RecordingFile = serde_json::from_str(&contents)?;
        tracing::debug!(run = %run, channels = file.channel_names.len(), "Loaded raw recording");
        Recording::new(
            RecordingMeta {
                sample_rate: file.sample_rate,
                channel_names: file.channel_names,
                sync_channel: file.sync_channel,
            },
            file.samples,
        )
        .map_err(|source| LoaderError::Invalid {
            run: run.to_string(),
            source,
        })
    }
}

/// Persists a recording into `dir` in the same JSON format the loader reads.
pub fn write_recording(dir: &Path, recording: &Recording) -> Result<(), LoaderError> {
    let file = RecordingFile {
        sample_rate: recording.meta.sample_rate,
        channel_names: recording.meta.channel_names.clone(),
        sync_channel: recording.meta.sync_channel,
        samples: recording.samples.clone(),
    };
    let path = dir.join(RECORDING_FILE_NAME);
    fs::write(&path, serde_json::to_string(&file)?)?;
    Ok(())
}

/// Reads a previously persisted recording back from `dir`.
pub fn read_recording(dir: &Path) -> Result<Recording, LoaderError> {
    let path = dir.join(RECORDING_FILE_NAME);
    let contents = fs::read_to_string(&path)?;
    let file: RecordingFile = serde_json::from_str(&contents)?;
    Recording::new(
        RecordingMeta {
            sample_rate: file.sample_rate,
            channel_names: file.channel_names,
            sync_channel: file.sync_channel,
        },
        file.samples,
    )
    .map_err(|source| LoaderError::Invalid {
        run: dir.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_recording() -> Recording {
        Recording::new(
            RecordingMeta {
                sample_rate: 1000.0,
                channel_names: vec!["ch0".into(), "sync".into()],
                sync_channel: Some(1),
            },
            vec![vec![1.0, 2.0, 3.0], vec![0.0, 5.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("run-01");
        fs::create_dir_all(&raw).unwrap();
        write_recording(&raw, &sample_recording()).unwrap();

        let run = Run::new("sub-01", "ses-01", "run-01", &raw);
        let loaded = JsonRecordingLoader.load(&run).unwrap();
        assert_eq!(loaded.num_channels(), 2);
        assert_eq!(loaded.sync_channel(), Some(1));
        assert_eq!(loaded.samples[0], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_recording_is_not_found() {
        let dir = tempdir().unwrap();
        let run = Run::new("sub-01", "ses-01", "run-01", dir.path());
        let err = JsonRecordingLoader.load(&run).unwrap_err();
        assert!(matches!(err, LoaderError::NotFound { .. }));
    }
}
