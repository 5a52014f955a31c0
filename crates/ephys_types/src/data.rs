use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Errors raised when a recording's shape or metadata is inconsistent.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum RecordingError {
    /// A channel's sample count differs from the others.
    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    /// The sync-channel flag points past the last channel.
    #[error("Sync channel index {index} out of range for {num_channels} channels")]
    SyncChannelOutOfRange { index: usize, num_channels: usize },
    /// The channel name list does not match the sample data.
    #[error("{names} channel names for {num_channels} channels")]
    ChannelNameMismatch { names: usize, num_channels: usize },
    /// The sample rate is zero or negative.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),
}

/// Metadata describing a recording and its layout.
///
/// This struct is immutable and shared via an `Arc`, so a recording handed
/// from one preprocessing step to the next stays self-describing without
/// copying the metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordingMeta {
    /// Sampling rate in Hz.
    pub sample_rate: f32,
    /// One name per channel, in channel order.
    pub channel_names: Vec<String>,
    /// Index of the channel carrying the synchronization signal, if any.
    ///
    /// The sync channel is not neural data: preprocessing steps leave it
    /// untouched and exclude it from any cross-channel statistic.
    #[serde(default)]
    pub sync_channel: Option<usize>,
}

impl RecordingMeta {
    pub fn num_channels(&self) -> usize {
        self.channel_names.len()
    }
}

/// An in-memory multi-channel recording: channel-major sample data plus
/// shared metadata.
///
/// A `Recording` is exclusively owned by whoever is transforming it. The
/// pipeline moves it into each step and receives a new one back, so no two
/// steps ever hold the same recording concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Shared pointer to the immutable recording metadata.
    pub meta: Arc<RecordingMeta>,
    /// Sample data, one `Vec<f32>` per channel.
    pub samples: Vec<Vec<f32>>,
}

impl Recording {
    /// Creates a recording and checks its shape invariants.
    pub fn new(meta: RecordingMeta, samples: Vec<Vec<f32>>) -> Result<Self, RecordingError> {
        let recording = Self {
            meta: Arc::new(meta),
            samples,
        };
        recording.validate()?;
        Ok(recording)
    }

    /// Number of channels, including the sync channel if present.
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples per channel.
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    /// Index of the flagged sync channel, if any.
    pub fn sync_channel(&self) -> Option<usize> {
        self.meta.sync_channel
    }

    /// Returns true if `channel` is the flagged sync channel.
    pub fn is_sync_channel(&self, channel: usize) -> bool {
        self.meta.sync_channel == Some(channel)
    }

    /// Checks that every channel has the same length, channel names match the
    /// data, the sample rate is positive, and the sync flag is in range.
    pub fn validate(&self) -> Result<(), RecordingError> {
        if !(self.meta.sample_rate > 0.0) {
            return Err(RecordingError::InvalidSampleRate(self.meta.sample_rate));
        }
        let expected = self.num_samples();
        for (channel, samples) in self.samples.iter().enumerate() {
            if samples.len() != expected {
                return Err(RecordingError::ChannelLengthMismatch {
                    channel,
                    expected,
                    actual: samples.len(),
                });
            }
        }
        if self.meta.channel_names.len() != self.samples.len() {
            return Err(RecordingError::ChannelNameMismatch {
                names: self.meta.channel_names.len(),
                num_channels: self.samples.len(),
            });
        }
        if let Some(index) = self.meta.sync_channel {
            if index >= self.samples.len() {
                return Err(RecordingError::SyncChannelOutOfRange {
                    index,
                    num_channels: self.samples.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(channels: usize, sync: Option<usize>) -> RecordingMeta {
        RecordingMeta {
            sample_rate: 1000.0,
            channel_names: (0..channels).map(|i| format!("ch{}", i)).collect(),
            sync_channel: sync,
        }
    }

    #[test]
    fn test_valid_recording() {
        let rec = Recording::new(meta(2, Some(1)), vec![vec![0.0; 10], vec![1.0; 10]]).unwrap();
        assert_eq!(rec.num_channels(), 2);
        assert_eq!(rec.num_samples(), 10);
        assert!(rec.is_sync_channel(1));
        assert!(!rec.is_sync_channel(0));
    }

    #[test]
    fn test_channel_length_mismatch() {
        let err = Recording::new(meta(2, None), vec![vec![0.0; 10], vec![0.0; 9]]).unwrap_err();
        assert!(matches!(
            err,
            RecordingError::ChannelLengthMismatch { channel: 1, .. }
        ));
    }

    #[test]
    fn test_sync_channel_out_of_range() {
        let err = Recording::new(meta(2, Some(2)), vec![vec![0.0; 4], vec![0.0; 4]]).unwrap_err();
        assert!(matches!(
            err,
            RecordingError::SyncChannelOutOfRange { index: 2, .. }
        ));
    }

    #[test]
    fn test_channel_name_mismatch() {
        let err = Recording::new(meta(3, None), vec![vec![0.0; 4], vec![0.0; 4]]).unwrap_err();
        assert!(matches!(err, RecordingError::ChannelNameMismatch { .. }));
    }
}
