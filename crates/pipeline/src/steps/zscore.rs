//! Per-channel standardization step.

use crate::error::{ConfigError, StepError};
use crate::registry::{parse_params, PreprocessingStep, StepFactory, StepParams};
use ephys_types::Recording;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ZscoreParams {
    /// Added to the standard deviation before dividing, so flat channels
    /// stay finite.
    #[serde(default = "default_eps")]
    pub eps: f32,
}

fn default_eps() -> f32 {
    1e-8
}

#[derive(Default)]
pub struct ZscoreFactory;

impl StepFactory for ZscoreFactory {
    fn step_name(&self) -> &'static str {
        "zscore"
    }

    fn description(&self) -> &'static str {
        "Per-channel z-scoring of non-sync channels"
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(ZscoreParams)).unwrap_or_default()
    }

    fn create(&self, params: &StepParams) -> Result<Box<dyn PreprocessingStep>, ConfigError> {
        let params: ZscoreParams = parse_params(self.step_name(), params)?;
        if !(params.eps >= 0.0) {
            return Err(ConfigError::InvalidParams {
                step: self.step_name().to_string(),
                message: "eps must be non-negative".to_string(),
            });
        }
        Ok(Box::new(Zscore { params }))
    }
}

#[derive(Debug)]
pub struct Zscore {
    params: ZscoreParams,
}

impl PreprocessingStep for Zscore {
    fn apply(&self, recording: Recording) -> Result<Recording, StepError> {
        let mut recording = recording;
        let num_samples = recording.num_samples();
        if num_samples == 0 {
            return Ok(recording);
        }

        for channel in 0..recording.num_channels() {
            if recording.is_sync_channel(channel) {
                continue;
            }
            let samples = &mut recording.samples[channel];
            let mean = samples.iter().sum::<f32>() / num_samples as f32;
            let var =
                samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / num_samples as f32;
            let denom = var.sqrt() + self.params.eps;
            for sample in samples.iter_mut() {
                *sample = (*sample - mean) / denom;
            }
        }
        Ok(recording)
    }
}
