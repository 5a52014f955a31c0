//! Common reference step: subtracts a per-sample mean or median computed
//! across the non-sync channels.

use crate::error::{ConfigError, StepError};
use crate::registry::{parse_params, PreprocessingStep, StepFactory, StepParams};
use ephys_types::Recording;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    Mean,
    Median,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CommonReferenceParams {
    /// Statistic subtracted from every non-sync channel at each sample.
    pub mode: ReferenceMode,
}

#[derive(Default)]
pub struct CommonReferenceFactory;

impl StepFactory for CommonReferenceFactory {
    fn step_name(&self) -> &'static str {
        "common_reference"
    }

    fn description(&self) -> &'static str {
        "Per-sample mean or median re-referencing across non-sync channels"
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(CommonReferenceParams)).unwrap_or_default()
    }

    fn create(&self, params: &StepParams) -> Result<Box<dyn PreprocessingStep>, ConfigError> {
        let params: CommonReferenceParams = parse_params(self.step_name(), params)?;
        Ok(Box::new(CommonReference { params }))
    }
}

#[derive(Debug)]
pub struct CommonReference {
    params: CommonReferenceParams,
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

impl PreprocessingStep for CommonReference {
    fn apply(&self, recording: Recording) -> Result<Recording, StepError> {
        let neural: Vec<usize> = (0..recording.num_channels())
            .filter(|&c| !recording.is_sync_channel(c))
            .collect();
        if neural.is_empty() {
            return Err(StepError::Failed(
                "no non-sync channels to re-reference".to_string(),
            ));
        }

        let mut recording = recording;
        let num_samples = recording.num_samples();
        let mut column = Vec::with_capacity(neural.len());
        for t in 0..num_samples {
            column.clear();
            column.extend(neural.iter().map(|&c| recording.samples[c][t]));
            let reference = match self.params.mode {
                ReferenceMode::Mean => column.iter().sum::<f32>() / column.len() as f32,
                ReferenceMode::Median => median(&mut column),
            };
            for &c in &neural {
                recording.samples[c][t] -= reference;
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
        Recording::new(
            RecordingMeta {
                sample_rate: 1000.0,
                channel_names: vec!["ch0".into(), "ch1".into(), "ch2".into(), "sync".into()],
                sync_channel: Some(3),
            },
            vec![
                vec![1.0, 2.0],
                vec![2.0, 4.0],
                vec![3.0, 6.0],
                vec![7.0, 7.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_mode_is_required() {
        let err = CommonReferenceFactory.create(&params(json!({}))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParams { .. }));
    }

    #[test]
    fn test_median_reference_excludes_sync_channel() {
        let step = CommonReferenceFactory
            .create(&params(json!({ "mode": "median" })))
            .unwrap();
        let out = step.apply(recording()).unwrap();

        // Median over {1,2,3} is 2; over {2,4,6} is 4. The sync value 7 never
        // enters the statistic and never changes.
        assert_eq!(out.samples[0], vec![-1.0, -2.0]);
        assert_eq!(out.samples[1], vec![0.0, 0.0]);
        assert_eq!(out.samples[2], vec![1.0, 2.0]);
        assert_eq!(out.samples[3], vec![7.0, 7.0]);
        assert_eq!(out.sync_channel(), Some(3));
    }

    #[test]
    fn test_mean_reference() {
        let step = CommonReferenceFactory
            .create(&params(json!({ "mode": "mean" })))
            .unwrap();
        let out = step.apply(recording()).unwrap();
        assert_eq!(out.samples[0], vec![-1.0, -2.0]);
        assert_eq!(out.samples[2], vec![1.0, 2.0]);
    }

    #[test]
    fn test_even_channel_median() {
        let mut values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut values), 2.5);
    }
}
