//! Step registry: the single source of truth for supported preprocessing
//! steps and their parameter schemas.
//!
//! Each step type registers a [`StepFactory`]. The resolver validates
//! configurations against the same registry the introspection surface
//! enumerates, so the two can never drift.

use crate::error::{ConfigError, StepError};
use ephys_types::Recording;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Step parameters as a flexible key-value map.
pub type StepParams = serde_json::Map<String, serde_json::Value>;

/// A single named, parameterized transformation over a recording.
///
/// `apply` consumes its input: a recording produced by one step is owned by
/// the pipeline until handed to the next step or persisted.
pub trait PreprocessingStep: std::fmt::Debug + Send + Sync {
    fn apply(&self, recording: Recording) -> Result<Recording, StepError>;
}

/// A factory for creating instances of a specific step type.
///
/// `create` validates the parameters against the step's typed schema and
/// fails with [`ConfigError::InvalidParams`] on any unknown name or type
/// mismatch — no unvalidated parameter ever reaches a step.
pub trait StepFactory: Send + Sync {
    /// Registry name of the step this factory creates.
    fn step_name(&self) -> &'static str;

    /// One-line description for the introspection surface.
    fn description(&self) -> &'static str;

    /// JSON schema of the accepted parameters.
    fn parameter_schema(&self) -> serde_json::Value;

    /// Creates a step instance with validated parameters.
    fn create(&self, params: &StepParams) -> Result<Box<dyn PreprocessingStep>, ConfigError>;
}

/// Introspection record for one supported step.
#[derive(Debug, Clone, Serialize)]
pub struct StepDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

/// Registry of step factories, keyed by step name.
#[derive(Default)]
pub struct StepRegistry {
    factories: BTreeMap<String, Box<dyn StepFactory>>,
}

impl StepRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step factory under its own name.
    pub fn register<F>(&mut self, factory: F)
    where
        F: StepFactory + 'static,
    {
        self.factories
            .insert(factory.step_name().to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Creates a step instance, validating `params` in the process.
    pub fn create(
        &self,
        name: &str,
        params: &StepParams,
    ) -> Result<Box<dyn PreprocessingStep>, ConfigError> {
        self.factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStep {
                name: name.to_string(),
            })?
            .create(params)
    }

    /// Validates `params` against the step's schema without keeping the
    /// instance.
    pub fn validate(&self, name: &str, params: &StepParams) -> Result<(), ConfigError> {
        self.create(name, params).map(|_| ())
    }

    /// All registered step names, in deterministic order.
    pub fn step_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Introspection records for every registered step, in deterministic
    /// order.
    pub fn descriptors(&self) -> Vec<StepDescriptor> {
        self.factories
            .values()
            .map(|f| StepDescriptor {
                name: f.step_name().to_string(),
                description: f.description().to_string(),
                parameter_schema: f.parameter_schema(),
            })
            .collect()
    }
}

/// Deserializes a step's raw parameter map into its typed params struct.
/// Unknown keys and type mismatches surface as [`ConfigError::InvalidParams`].
pub(crate) fn parse_params<T: DeserializeOwned>(
    step: &str,
    params: &StepParams,
) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::Object(params.clone())).map_err(|e| {
        ConfigError::InvalidParams {
            step: step.to_string(),
            message: e.to_string(),
        }
    })
}

/// Registry with all builtin steps registered.
pub fn default_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    crate::steps::register_builtin_steps(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = StepRegistry::new();
        assert!(registry.step_names().is_empty());
        assert!(!registry.contains("bandpass_filter"));
    }

    #[test]
    fn test_unknown_step_create_fails() {
        let registry = StepRegistry::new();
        let err = registry.create("mystery", &StepParams::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStep { .. }));
    }

    #[test]
    fn test_default_registry_lists_builtins() {
        let registry = default_registry();
        assert_eq!(
            registry.step_names(),
            vec![
                "bandpass_filter",
                "common_reference",
                "notch_filter",
                "zscore"
            ]
        );
    }

    #[test]
    fn test_descriptors_match_registry() {
        let registry = default_registry();
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            registry
                .step_names()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        );
    }
}
