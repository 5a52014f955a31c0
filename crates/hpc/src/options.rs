//! Scheduler resource options with per-field override merging.

use serde::{Deserialize, Serialize};

/// Resource requests written into a job's `#SBATCH` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlurmOptions {
    pub cpus_per_task: u32,
    /// Memory request in SLURM syntax, e.g. "16G".
    pub mem: String,
    /// Wall-clock limit in SLURM syntax, e.g. "04:00:00".
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// Comma-separated node exclude list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

impl Default for SlurmOptions {
    fn default() -> Self {
        Self {
            cpus_per_task: 4,
            mem: "32G".to_string(),
            time: "04:00:00".to_string(),
            partition: None,
            exclude: None,
        }
    }
}

/// Partial options: only the set fields replace the corresponding defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlurmOptionsOverrides {
    #[serde(default)]
    pub cpus_per_task: Option<u32>,
    #[serde(default)]
    pub mem: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
}

impl SlurmOptionsOverrides {
    /// Applies the set fields over `base`, leaving the rest untouched.
    pub fn apply(&self, base: &SlurmOptions) -> SlurmOptions {
        SlurmOptions {
            cpus_per_task: self.cpus_per_task.unwrap_or(base.cpus_per_task),
            mem: self.mem.clone().unwrap_or_else(|| base.mem.clone()),
            time: self.time.clone().unwrap_or_else(|| base.time.clone()),
            partition: self.partition.clone().or_else(|| base.partition.clone()),
            exclude: self.exclude.clone().or_else(|| base.exclude.clone()),
        }
    }
}
