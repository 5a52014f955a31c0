//! Zero-state IIR bandpass step: Butterworth highpass/lowpass cascade.

use crate::error::{ConfigError, StepError};
use crate::registry::{parse_params, PreprocessingStep, StepFactory, StepParams};
use biquad::{
    Biquad, Coefficients, DirectForm2Transposed as DF2T, ToHertz, Type, Q_BUTTERWORTH_F32,
};
use ephys_types::Recording;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BandpassParams {
    /// Highpass cutoff (Hz).
    pub low_hz: f32,
    /// Lowpass cutoff (Hz). Must sit below the recording's Nyquist frequency.
    pub high_hz: f32,
}

#[derive(Default)]
pub struct BandpassFilterFactory;

impl StepFactory for BandpassFilterFactory {
    fn step_name(&self) -> &'static str {
        "bandpass_filter"
    }

    fn description(&self) -> &'static str {
        "Butterworth bandpass (highpass + lowpass cascade) over non-sync channels"
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(BandpassParams)).unwrap_or_default()
    }

    fn create(&self, params: &StepParams) -> Result<Box<dyn PreprocessingStep>, ConfigError> {
        let params: BandpassParams = parse_params(self.step_name(), params)?;
        if !(params.low_hz > 0.0 && params.high_hz > params.low_hz) {
            return Err(ConfigError::InvalidParams {
                step: self.step_name().to_string(),
                message: "0 < low_hz < high_hz required".to_string(),
            });
        }
        Ok(Box::new(BandpassFilter { params }))
    }
}

#[derive(Debug)]
pub struct BandpassFilter {
    params: BandpassParams,
}

impl PreprocessingStep for BandpassFilter {
    fn apply(&self, recording: Recording) -> Result<Recording, StepError> {
        let fs = recording.meta.sample_rate;
        if self.params.high_hz >= fs / 2.0 {
            return Err(StepError::BadParam(format!(
                "high_hz {} at or above Nyquist ({} Hz)",
                self.params.high_hz,
                fs / 2.0
            )));
        }

        let hp = Coefficients::<f32>::from_params(
            Type::HighPass,
            fs.hz(),
            self.params.low_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| StepError::FilterDesign(format!("{:?}", e)))?;
        let lp = Coefficients::<f32>::from_params(
            Type::LowPass,
            fs.hz(),
            self.params.high_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| StepError::FilterDesign(format!("{:?}", e)))?;

        let mut recording = recording;
        for channel in 0..recording.num_channels() {
            if recording.is_sync_channel(channel) {
                continue;
            }
            // Fresh filter state per channel.
            let mut hp_stage = DF2T::<f32>::new(hp);
            let mut lp_stage = DF2T::<f32>::new(lp);
            for sample in &mut recording.samples[channel] {
                *sample = lp_stage.run(hp_stage.run(*sample));
            }
        }
        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephys_types::RecordingMeta;
    use serde_json::json;

    fn params(value: serde_json::Value) -> StepParams {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn recording() -> Recording {
        // Channel 0: constant DC. Channel 1 (sync): a TTL-style pulse train.
        Recording::new(
            RecordingMeta {
                sample_rate: 30000.0,
                channel_names: vec!["ch0".into(), "sync".into()],
                sync_channel: Some(1),
            },
            vec![
                vec![1.0; 256],
                (0..256).map(|i| if i % 2 == 0 { 5.0 } else { 0.0 }).collect(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_inverted_band() {
        let err = BandpassFilterFactory
            .create(&params(json!({ "low_hz": 6000.0, "high_hz": 300.0 })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParams { .. }));
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let err = BandpassFilterFactory
            .create(&params(json!({ "low_hz": 300.0, "high_hz": 6000.0, "order": 4 })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParams { .. }));
    }

    #[test]
    fn test_high_cut_above_nyquist_fails_at_apply() {
        let step = BandpassFilterFactory
            .create(&params(json!({ "low_hz": 300.0, "high_hz": 20000.0 })))
            .unwrap();
        let err = step.apply(recording()).unwrap_err();
        assert!(matches!(err, StepError::BadParam(_)));
    }

    #[test]
    fn test_removes_dc_and_skips_sync_channel() {
        let step = BandpassFilterFactory
            .create(&params(json!({ "low_hz": 300.0, "high_hz": 6000.0 })))
            .unwrap();
        let input = recording();
        let sync_before = input.samples[1].clone();

        let output = step.apply(input).unwrap();
        assert_eq!(output.num_channels(), 2);
        assert_eq!(output.num_samples(), 256);
        // Highpass drives the DC channel toward zero.
        let tail = &output.samples[0][200..];
        assert!(tail.iter().all(|v| v.abs() < 0.2));
        // Sync channel untouched.
        assert_eq!(output.samples[1], sync_before);
        assert_eq!(output.sync_channel(), Some(1));
    }
}
