//! Self-contained job descriptors.
//!
//! A descriptor carries everything a worker process needs to execute one run:
//! the run identity (with its raw path), the fully resolved step
//! configuration, the output root, and the resource options it was submitted
//! with. The worker re-resolves nothing; the configuration frozen at dispatch
//! time is the one that executes.

use ephys_types::Run;
use pipeline::ResolvedConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::options::SlurmOptions;

pub const DESCRIPTOR_FILE: &str = "descriptor.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    pub run: Run,
    pub config: ResolvedConfig,
    pub output_root: PathBuf,
    pub options: SlurmOptions,
}

impl JobDescriptor {
    pub fn new(
        run: Run,
        config: ResolvedConfig,
        output_root: impl Into<PathBuf>,
        options: SlurmOptions,
    ) -> Self {
        Self {
            run,
            config,
            output_root: output_root.into(),
            options,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        fs::write(path, serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}
