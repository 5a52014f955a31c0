//! Preprocessing pipeline engine for spikeprep.
//!
//! Turns a declarative step configuration into a deterministic, per-run
//! sequence of transformations over recording data: config resolution with
//! defined override precedence, a registry of step capabilities, a per-run
//! state machine with provenance tracking, and batch execution with strict
//! run isolation.

pub mod config;
pub mod error;
pub mod executor;
pub mod provenance;
pub mod registry;
pub mod steps;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use executor::*;
pub use provenance::*;
pub use registry::*;
