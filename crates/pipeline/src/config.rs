//! Step configuration: defaults, named presets, layered merging, and
//! fail-fast validation against the step registry.
//!
//! A configuration is an ordered list of `(step, params)` entries. Resolution
//! layers up to three configurations — builtin default, optional preset,
//! explicit user overrides — merging by step name with per-parameter
//! precedence: user overrides > preset > default. Step order is the order of
//! first appearance and is fixed once resolved.

use crate::error::ConfigError;
use crate::registry::{StepParams, StepRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;

/// One entry in a step configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEntry {
    /// Step type name, drawn from the registry.
    #[serde(rename = "step")]
    pub name: String,
    /// Step parameters, validated against the step's schema at resolution.
    #[serde(default)]
    pub params: StepParams,
    /// Whether this step participates in the resolved order. An override
    /// layer can disable a step without removing it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StepEntry {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => map,
            _ => StepParams::new(),
        };
        Self {
            name: name.into(),
            params,
            enabled: true,
        }
    }
}

/// An ordered, unresolved step configuration (one merge layer).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    pub steps: Vec<StepEntry>,
}

impl StepConfig {
    pub fn new(steps: Vec<StepEntry>) -> Self {
        Self { steps }
    }

    /// Rejects configurations that list the same step twice within this
    /// layer; merging across layers is by step name, so duplicates inside a
    /// layer would be ambiguous.
    fn check_duplicates(&self) -> Result<(), ConfigError> {
        for (i, entry) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|e| e.name == entry.name) {
                return Err(ConfigError::DuplicateStep {
                    name: entry.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StepConfig = serde_json::from_str(json)?;
        config.check_duplicates()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Loads a step configuration from a JSON file.
pub fn load_config_file(path: &Path) -> Result<StepConfig, ConfigError> {
    StepConfig::from_json(&fs::read_to_string(path)?)
}

/// Saves a step configuration to a JSON file.
pub fn save_config_file(path: &Path, config: &StepConfig) -> Result<(), ConfigError> {
    fs::write(path, config.to_json()?)?;
    Ok(())
}

/// The builtin default configuration: spike-band filter plus median
/// common reference.
pub fn default_config() -> StepConfig {
    StepConfig::new(vec![
        StepEntry::new("bandpass_filter", json!({ "low_hz": 300.0, "high_hz": 6000.0 })),
        StepEntry::new("common_reference", json!({ "mode": "median" })),
    ])
}

/// Names of the builtin presets, in deterministic order.
pub fn available_presets() -> Vec<&'static str> {
    vec!["lfp", "spikes"]
}

/// Looks up a builtin preset by name.
pub fn preset(name: &str) -> Result<StepConfig, ConfigError> {
    match name {
        "spikes" => Ok(StepConfig::new(vec![
            StepEntry::new("bandpass_filter", json!({ "low_hz": 300.0, "high_hz": 6000.0 })),
            StepEntry::new("common_reference", json!({ "mode": "median" })),
        ])),
        "lfp" => Ok(StepConfig::new(vec![
            StepEntry::new("bandpass_filter", json!({ "low_hz": 1.0, "high_hz": 300.0 })),
            StepEntry::new("notch_filter", json!({ "freq_hz": 50.0 })),
            StepEntry::new("zscore", json!({})),
        ])),
        _ => Err(ConfigError::UnknownPreset {
            name: name.to_string(),
        }),
    }
}

/// A validated, resolved configuration: the fixed step order the pipeline
/// executes. Only enabled steps survive resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedConfig {
    steps: Vec<StepEntry>,
}

impl ResolvedConfig {
    /// The resolved step sequence, in execution order.
    pub fn steps(&self) -> &[StepEntry] {
        &self.steps
    }

    /// Canonical JSON of the resolved `(step, params)` sequence. Two
    /// resolutions describe the same processing iff their canonical forms are
    /// byte-identical; used for idempotence checks against stored provenance.
    pub fn canonical(&self) -> String {
        let projection: Vec<serde_json::Value> = self
            .steps
            .iter()
            .map(|e| json!({ "step": e.name, "params": e.params }))
            .collect();
        serde_json::Value::Array(projection).to_string()
    }

    /// Pretty JSON for the `show-config` introspection surface.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.steps)?)
    }
}

/// Merges `layer` into `acc`: existing steps merge per parameter (the layer
/// wins), new steps append in layer order.
fn merge_layer(acc: &mut Vec<StepEntry>, layer: &StepConfig) {
    for entry in &layer.steps {
        if let Some(existing) = acc.iter_mut().find(|e| e.name == entry.name) {
            for (key, value) in &entry.params {
                existing.params.insert(key.clone(), value.clone());
            }
            existing.enabled = entry.enabled;
        } else {
            acc.push(entry.clone());
        }
    }
}

/// Resolves a configuration from up to three layers and validates every
/// entry against `registry`.
///
/// Pure over its inputs. Fails fast when any layer references a step outside
/// the registry, when parameters mismatch a step's schema (including
/// parameters of disabled steps — nothing is silently dropped), or when the
/// resolved order ends up empty.
pub fn resolve(
    default: &StepConfig,
    preset: Option<&StepConfig>,
    overrides: Option<&StepConfig>,
    registry: &StepRegistry,
) -> Result<ResolvedConfig, ConfigError> {
    default.check_duplicates()?;
    if let Some(p) = preset {
        p.check_duplicates()?;
    }
    if let Some(o) = overrides {
        o.check_duplicates()?;
    }

    let mut merged: Vec<StepEntry> = Vec::new();
    merge_layer(&mut merged, default);
    if let Some(p) = preset {
        merge_layer(&mut merged, p);
    }
    if let Some(o) = overrides {
        merge_layer(&mut merged, o);
    }

    for entry in &merged {
        if !registry.contains(&entry.name) {
            return Err(ConfigError::UnknownStep {
                name: entry.name.clone(),
            });
        }
        registry.validate(&entry.name, &entry.params)?;
    }

    let steps: Vec<StepEntry> = merged.into_iter().filter(|e| e.enabled).collect();
    if steps.is_empty() {
        return Err(ConfigError::EmptySteps);
    }

    tracing::debug!(
        steps = ?steps.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        "Resolved step configuration"
    );
    Ok(ResolvedConfig { steps })
}
