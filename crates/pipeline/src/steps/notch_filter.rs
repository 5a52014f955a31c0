//! Powerline notch filter step.

use crate::error::{ConfigError, StepError};
use crate::registry::{parse_params, PreprocessingStep, StepFactory, StepParams};
use biquad::{Biquad, Coefficients, DirectForm2Transposed as DF2T, ToHertz, Type};
use ephys_types::Recording;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NotchParams {
    /// Notch center frequency (Hz), typically 50 or 60.
    pub freq_hz: f32,
    /// Filter Q. Higher means a narrower notch.
    #[serde(default = "default_q")]
    pub q: f32,
}

fn default_q() -> f32 {
    30.0
}

#[derive(Default)]
pub struct NotchFilterFactory;

impl StepFactory for NotchFilterFactory {
    fn step_name(&self) -> &'static str {
        "notch_filter"
    }

    fn description(&self) -> &'static str {
        "Narrow IIR notch at a powerline frequency over non-sync channels"
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(NotchParams)).unwrap_or_default()
    }

    fn create(&self, params: &StepParams) -> Result<Box<dyn PreprocessingStep>, ConfigError> {
        let params: NotchParams = parse_params(self.step_name(), params)?;
        if !(params.freq_hz > 0.0 && params.q > 0.0) {
            return Err(ConfigError::InvalidParams {
                step: self.step_name().to_string(),
                message: "freq_hz and q must be positive".to_string(),
            });
        }
        Ok(Box::new(NotchFilter { params }))
    }
}

#[derive(Debug)]
pub struct NotchFilter {
    params: NotchParams,
}

impl PreprocessingStep for NotchFilter {
    fn apply(&self, recording: Recording) -> Result<Recording, StepError> {
        let fs = recording.meta.sample_rate;
        if self.params.freq_hz >= fs / 2.0 {
            return Err(StepError::BadParam(format!(
                "freq_hz {} at or above Nyquist ({} Hz)",
                self.params.freq_hz,
                fs / 2.0
            )));
        }

        let coeffs = Coefficients::<f32>::from_params(
            Type::Notch,
            fs.hz(),
            self.params.freq_hz.hz(),
            self.params.q,
        )
        .map_err(|e| StepError::FilterDesign(format!("{:?}", e)))?;

        let mut recording = recording;
        for channel in 0..recording.num_channels() {
            if recording.is_sync_channel(channel) {
                continue;
            }
            let mut stage = DF2T::<f32>::new(coeffs);
            for sample in &mut recording.samples[channel] {
                *sample = stage.run(*sample);
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

    #[test]
    fn test_default_q_applied() {
        NotchFilterFactory
            .create(&params(json!({ "freq_hz": 50.0 })))
            .unwrap();
    }

    #[test]
    fn test_rejects_nonpositive_frequency() {
        let err = NotchFilterFactory
            .create(&params(json!({ "freq_hz": 0.0 })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParams { .. }));
    }

    #[test]
    fn test_sync_channel_untouched() {
        let step = NotchFilterFactory
            .create(&params(json!({ "freq_hz": 50.0 })))
            .unwrap();
        let rec = Recording::new(
            RecordingMeta {
                sample_rate: 1000.0,
                channel_names: vec!["ch0".into(), "sync".into()],
                sync_channel: Some(1),
            },
            vec![
                (0..100).map(|i| (i as f32 * 0.3).sin()).collect(),
                vec![5.0; 100],
            ],
        )
        .unwrap();

        let out = step.apply(rec).unwrap();
        assert_eq!(out.samples[1], vec![5.0; 100]);
    }
}
