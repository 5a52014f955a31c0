//! Per-run provenance: an append-only record of what the pipeline did.
//!
//! Provenance serves two purposes. It is an audit artifact written next to
//! the processed data, and it is the idempotence key: a stored record whose
//! canonical form matches the canonical form of a resolved configuration
//! marks the run as already processed with that exact configuration.

use crate::config::ResolvedConfig;
use crate::registry::StepParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;

/// One executed (or attempted) step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceEntry {
    pub step_name: String,
    pub params: StepParams,
    pub duration_secs: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full provenance record for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    /// Run identity as "subject/session/run".
    pub run: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ProvenanceEntry>,
}

impl Provenance {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        step_name: &str,
        params: &StepParams,
        duration_secs: f64,
        result: Result<(), String>,
    ) {
        let (success, error) = match result {
            Ok(()) => (true, None),
            Err(message) => (false, Some(message)),
        };
        self.entries.push(ProvenanceEntry {
            step_name: step_name.to_string(),
            params: params.clone(),
            duration_secs,
            success,
            error,
        });
    }

    pub fn all_succeeded(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.success)
    }

    /// Canonical JSON of the `(step, params, success)` projection. Durations
    /// and timestamps vary between physically identical reruns and are
    /// excluded.
    pub fn canonical(&self) -> String {
        let projection: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|e| json!({ "step": e.step_name, "params": e.params, "success": e.success }))
            .collect();
        serde_json::Value::Array(projection).to_string()
    }

    /// The canonical form a fully successful execution of `config` would
    /// produce. Matching this against a stored record decides whether a run
    /// can be skipped.
    pub fn expected_for(config: &ResolvedConfig) -> String {
        let projection: Vec<serde_json::Value> = config
            .steps()
            .iter()
            .map(|e| json!({ "step": e.name, "params": e.params, "success": true }))
            .collect();
        serde_json::Value::Array(projection).to_string()
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
