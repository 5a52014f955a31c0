//! Job script generation and submission.

use ephys_types::Run;
use pipeline::ResolvedConfig;
use session::OutputPathManager;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::descriptor::{JobDescriptor, DESCRIPTOR_FILE};
use crate::options::SlurmOptions;

pub const SCRIPT_FILE: &str = "job.sbatch";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    #[error("Submission rejected: {0}")]
    SubmissionFailed(String),

    #[error("Could not parse scheduler response: {0:?}")]
    UnexpectedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Submits a prepared job script and returns the scheduler's job id.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, script: &Path) -> Result<u64, DispatchError>;
}

/// Submits through the local `sbatch` binary.
#[derive(Debug, Default)]
pub struct SbatchSubmitter;

impl JobSubmitter for SbatchSubmitter {
    fn submit(&self, script: &Path) -> Result<u64, DispatchError> {
        let output = Command::new("sbatch")
            .arg(script)
            .output()
            .map_err(|e| DispatchError::SchedulerUnavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(DispatchError::SubmissionFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_sbatch_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses sbatch's "Submitted batch job <id>" acknowledgement.
fn parse_sbatch_output(stdout: &str) -> Result<u64, DispatchError> {
    stdout
        .split_whitespace()
        .last()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| DispatchError::UnexpectedOutput(stdout.to_string()))
}

/// One run's dispatch result.
#[derive(Debug)]
pub struct SubmissionReport {
    pub run: String,
    pub script: PathBuf,
    pub result: Result<u64, DispatchError>,
}

/// Generates one job per run and hands each to a [`JobSubmitter`].
///
/// Dispatch mirrors local batch semantics: each run is an independent job,
/// and one rejected submission never blocks its siblings.
pub struct HpcJobDispatcher {
    paths: OutputPathManager,
    options: SlurmOptions,
}

impl HpcJobDispatcher {
    pub fn new(paths: OutputPathManager, options: SlurmOptions) -> Self {
        Self { paths, options }
    }

    /// Writes the descriptor and sbatch script for one run into its slurm
    /// directory.
    pub fn prepare_job(&self, run: &Run, config: &ResolvedConfig) -> Result<PathBuf, DispatchError> {
        let slurm_dir = self.paths.prepare(&self.paths.slurm_dir(run))?;

        let descriptor_path = slurm_dir.join(DESCRIPTOR_FILE);
        JobDescriptor::new(
            run.clone(),
            config.clone(),
            self.paths.output_root(),
            self.options.clone(),
        )
        .write(&descriptor_path)?;

        let script_path = slurm_dir.join(SCRIPT_FILE);
        fs::write(
            &script_path,
            self.render_script(run, &slurm_dir, &descriptor_path),
        )?;
        Ok(script_path)
    }

    fn render_script(&self, run: &Run, slurm_dir: &Path, descriptor: &Path) -> String {
        let mut script = String::new();
        let _ = writeln!(script, "#!/bin/bash");
        let _ = writeln!(
            script,
            "#SBATCH --job-name=spikeprep-{}-{}-{}",
            run.subject_id, run.session_id, run.run_id
        );
        let _ = writeln!(script, "#SBATCH --cpus-per-task={}", self.options.cpus_per_task);
        let _ = writeln!(script, "#SBATCH --mem={}", self.options.mem);
        let _ = writeln!(script, "#SBATCH --time={}", self.options.time);
        if let Some(partition) = &self.options.partition {
            let _ = writeln!(script, "#SBATCH --partition={}", partition);
        }
        if let Some(exclude) = &self.options.exclude {
            let _ = writeln!(script, "#SBATCH --exclude={}", exclude);
        }
        let _ = writeln!(script, "#SBATCH --output={}/%x-%j.out", slurm_dir.display());
        let _ = writeln!(script);
        let _ = writeln!(script, "set -euo pipefail");
        let _ = writeln!(script, "spikeprep run-one --descriptor {}", descriptor.display());
        script
    }

    /// Prepares and submits one job per run, in run order. Per-run failures
    /// land in the corresponding report; the batch always yields one report
    /// per requested run.
    pub fn dispatch(
        &self,
        runs: &[Run],
        config: &ResolvedConfig,
        submitter: &dyn JobSubmitter,
    ) -> Vec<SubmissionReport> {
        runs.iter()
            .map(|run| {
                let result = self
                    .prepare_job(run, config)
                    .and_then(|script| submitter.submit(&script).map(|id| (script, id)));
                match result {
                    Ok((script, id)) => {
                        tracing::info!(run = %run, job_id = id, "Submitted job");
                        SubmissionReport {
                            run: run.to_string(),
                            script,
                            result: Ok(id),
                        }
                    }
                    Err(err) => {
                        tracing::warn!(run = %run, error = %err, "Job submission failed");
                        SubmissionReport {
                            run: run.to_string(),
                            script: self.paths.slurm_dir(run).join(SCRIPT_FILE),
                            result: Err(err),
                        }
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{default_config, default_registry, resolve};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct MockSubmitter {
        scripts: Mutex<Vec<PathBuf>>,
        reject: Option<usize>,
    }

    impl MockSubmitter {
        fn new(reject: Option<usize>) -> Self {
            Self {
                scripts: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    impl JobSubmitter for MockSubmitter {
        fn submit(&self, script: &Path) -> Result<u64, DispatchError> {
            let mut scripts = self.scripts.lock().unwrap();
            let index = scripts.len();
            scripts.push(script.to_path_buf());
            if self.reject == Some(index) {
                return Err(DispatchError::SubmissionFailed("queue full".to_string()));
            }
            Ok(1000 + index as u64)
        }
    }

    fn runs() -> Vec<Run> {
        vec![
            Run::new("sub-01", "ses-01", "run-001", "/raw/a"),
            Run::new("sub-01", "ses-01", "run-002", "/raw/b"),
            Run::new("sub-02", "ses-01", "run-001", "/raw/c"),
        ]
    }

    fn resolved() -> ResolvedConfig {
        let registry = default_registry();
        resolve(&default_config(), None, None, &registry).unwrap()
    }

    #[test]
    fn test_one_job_per_run_with_artifacts() {
        let dir = tempdir().unwrap();
        let paths = OutputPathManager::new(dir.path());
        let dispatcher = HpcJobDispatcher::new(paths.clone(), SlurmOptions::default());
        let submitter = MockSubmitter::new(None);

        let reports = dispatcher.dispatch(&runs(), &resolved(), &submitter);
        assert_eq!(reports.len(), 3);
        for (report, run) in reports.iter().zip(runs()) {
            assert!(report.result.is_ok());
            assert!(report.script.is_file());
            assert!(paths.slurm_dir(&run).join(DESCRIPTOR_FILE).is_file());
        }
    }

    #[test]
    fn test_script_carries_resource_options() {
        let dir = tempdir().unwrap();
        let options = SlurmOptions {
            mem: "16G".to_string(),
            partition: Some("short".to_string()),
            ..SlurmOptions::default()
        };
        let dispatcher = HpcJobDispatcher::new(OutputPathManager::new(dir.path()), options);
        let run = Run::new("sub-01", "ses-01", "run-001", "/raw/a");

        let script_path = dispatcher.prepare_job(&run, &resolved()).unwrap();
        let script = fs::read_to_string(script_path).unwrap();
        assert!(script.contains("#SBATCH --mem=16G"));
        assert!(script.contains("#SBATCH --partition=short"));
        assert!(script.contains("spikeprep run-one --descriptor"));
    }

    #[test]
    fn test_descriptor_freezes_the_resolved_config() {
        let dir = tempdir().unwrap();
        let paths = OutputPathManager::new(dir.path());
        let dispatcher = HpcJobDispatcher::new(paths.clone(), SlurmOptions::default());
        let run = Run::new("sub-01", "ses-01", "run-001", "/raw/a");
        let config = resolved();

        dispatcher.prepare_job(&run, &config).unwrap();
        let descriptor =
            JobDescriptor::load(&paths.slurm_dir(&run).join(DESCRIPTOR_FILE)).unwrap();
        assert_eq!(descriptor.config.canonical(), config.canonical());
        assert_eq!(descriptor.run, run);
    }

    #[test]
    fn test_rejected_submission_does_not_block_siblings() {
        let dir = tempdir().unwrap();
        let dispatcher = HpcJobDispatcher::new(
            OutputPathManager::new(dir.path()),
            SlurmOptions::default(),
        );
        let submitter = MockSubmitter::new(Some(1));

        let reports = dispatcher.dispatch(&runs(), &resolved(), &submitter);
        assert_eq!(reports.len(), 3);
        assert!(reports[0].result.is_ok());
        assert!(reports[1].result.is_err());
        assert!(reports[2].result.is_ok());
    }

    #[test]
    fn test_parse_sbatch_acknowledgement() {
        assert_eq!(parse_sbatch_output("Submitted batch job 4242\n").unwrap(), 4242);
        assert!(parse_sbatch_output("something went wrong").is_err());
    }
}
