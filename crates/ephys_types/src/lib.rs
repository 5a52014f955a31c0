//! Shared types for the spikeprep preprocessing system
//!
//! This crate contains the core data model used throughout the preprocessing
//! orchestrator: recording handles, their metadata, and run identifiers.

pub mod data;
pub mod run;

// Re-export commonly used types
pub use data::*;
pub use run::*;
