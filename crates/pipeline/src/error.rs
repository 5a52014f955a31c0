//! Error types for the pipeline engine.

use thiserror::Error;

/// Configuration resolution errors. These fail fast, before any execution.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Step not in registry: {name}")]
    UnknownStep { name: String },

    #[error("Invalid parameters for step '{step}': {message}")]
    InvalidParams { step: String, message: String },

    #[error("Step '{name}' appears more than once in a configuration layer")]
    DuplicateStep { name: String },

    #[error("Resolved step order is empty")]
    EmptySteps,

    #[error("Unknown preset: {name}")]
    UnknownPreset { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a single step's `apply`. Scoped to one run; the executor
/// captures them as `StepFailed` state without touching sibling runs.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error("bad param {0}")]
    BadParam(String),

    #[error("filter design failed: {0}")]
    FilterDesign(String),

    #[error("recording shape error: {0}")]
    Shape(#[from] ephys_types::RecordingError),

    #[error("step failed: {0}")]
    Failed(String),
}

/// Run-level errors outside the step state machine: loading raw data or
/// persisting artifacts. A batch reports the affected run as failed and
/// continues with its siblings.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load raw data: {0}")]
    Load(#[from] session::LoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
