//! Canonical output path derivation.
//!
//! Output layout: `root/{subject}/{session}/{run}/{step|final}/...` plus a
//! provenance artifact, a sync-artifact directory, and a slurm directory per
//! run. Paths are a pure function of the run and step name; directories are
//! created lazily on `prepare`, never speculatively, so an early failure
//! leaves no orphan directories behind.

use ephys_types::Run;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory name for the final (post-pipeline) output of a run.
pub const FINAL_DIR: &str = "final";
/// Per-run provenance artifact file name.
pub const PROVENANCE_FILE: &str = "provenance.json";

/// Derives canonical output paths under a fixed output root.
#[derive(Debug, Clone)]
pub struct OutputPathManager {
    output_root: PathBuf,
}

impl OutputPathManager {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// The run's output directory: `root/{subject}/{session}/{run}`.
    pub fn run_dir(&self, run: &Run) -> PathBuf {
        self.output_root
            .join(&run.subject_id)
            .join(&run.session_id)
            .join(&run.run_id)
    }

    /// Output directory for one step of a run, or the final directory when
    /// `step` is `None`. Distinct `(run, step)` pairs never collide: the
    /// mapping appends only the run key and the step name.
    pub fn path_for(&self, run: &Run, step: Option<&str>) -> PathBuf {
        self.run_dir(run).join(step.unwrap_or(FINAL_DIR))
    }

    /// The run's provenance artifact path.
    pub fn provenance_path(&self, run: &Run) -> PathBuf {
        self.run_dir(run).join(PROVENANCE_FILE)
    }

    /// Directory for sync-channel artifacts of a run.
    pub fn sync_dir(&self, run: &Run) -> PathBuf {
        self.run_dir(run).join("sync")
    }

    /// Directory for a run's job script, descriptor, and scheduler logs.
    pub fn slurm_dir(&self, run: &Run) -> PathBuf {
        self.run_dir(run).join("slurm")
    }

    /// Creates `dir` (and parents) immediately before a write lands in it.
    pub fn prepare(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        Ok(dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run(subject: &str, session: &str, run_id: &str) -> Run {
        Run::new(subject, session, run_id, "/raw")
    }

    #[test]
    fn test_paths_are_unique_per_run_and_step() {
        let paths = OutputPathManager::new("/out");
        let a = run("sub-01", "ses-01", "run-01");
        let b = run("sub-01", "ses-01", "run-02");

        let mut seen = std::collections::HashSet::new();
        for r in [&a, &b] {
            for step in [None, Some("bandpass_filter"), Some("common_reference")] {
                assert!(seen.insert(paths.path_for(r, step)));
            }
        }
    }

    #[test]
    fn test_final_path_layout() {
        let paths = OutputPathManager::new("/out");
        let r = run("sub-01", "ses-02", "run-03");
        assert_eq!(
            paths.path_for(&r, None),
            PathBuf::from("/out/sub-01/ses-02/run-03/final")
        );
        assert_eq!(
            paths.provenance_path(&r),
            PathBuf::from("/out/sub-01/ses-02/run-03/provenance.json")
        );
    }

    #[test]
    fn test_no_directories_created_before_prepare() {
        let dir = tempdir().unwrap();
        let paths = OutputPathManager::new(dir.path());
        let r = run("sub-01", "ses-01", "run-01");

        let target = paths.path_for(&r, None);
        assert!(!target.exists());

        paths.prepare(&target).unwrap();
        assert!(target.is_dir());
    }
}
