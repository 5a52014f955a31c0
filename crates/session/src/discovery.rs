//! Raw run discovery over the subject/session/run directory tree.
//!
//! Expected layout: `root/sub-*/ses-*/<run>/...raw data...`. Entries that do
//! not match the layout are skipped rather than treated as errors; only a
//! missing or unreadable root aborts discovery.

use crate::loader::RECORDING_FILE_NAME;
use crate::paths::{FINAL_DIR, PROVENANCE_FILE};
use ephys_types::Run;
use std::fs;
use std::io;
use std::path::Path;

/// Errors fatal to a discovery invocation.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Input root does not exist: {0}")]
    RootNotFound(String),
    #[error("Input root is not readable: {path}: {source}")]
    RootUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Lists the directories under `dir` whose names pass `keep`, sorted by name.
///
/// Read errors below the root are logged and the entry skipped; discovery of
/// an imperfect tree is still deterministic over the readable part.
fn subdirectories(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<(String, std::path::PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        if keep(&name) {
            dirs.push((name, path));
        } else {
            tracing::debug!(path = %path.display(), "Skipping non-matching directory");
        }
    }
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    dirs
}

/// Scans `root` and enumerates raw runs in lexicographic
/// `(subject, session, run)` order.
///
/// `subject_filter` / `session_filter` restrict the scan to a single subject
/// or session directory name. The ordering (and therefore the result of
/// repeated discovery over an unchanged tree) is deterministic.
pub fn discover(
    root: &Path,
    subject_filter: Option<&str>,
    session_filter: Option<&str>,
) -> Result<Vec<Run>, DiscoveryError> {
    if !root.exists() {
        return Err(DiscoveryError::RootNotFound(root.display().to_string()));
    }
    // Probe readability of the root itself; everything below is best-effort.
    fs::read_dir(root).map_err(|source| DiscoveryError::RootUnreadable {
        path: root.display().to_string(),
        source,
    })?;

    let mut runs = Vec::new();
    for (subject_id, subject_path) in subdirectories(root, |name| {
        name.starts_with("sub-") && subject_filter.map_or(true, |f| f == name)
    }) {
        for (session_id, session_path) in subdirectories(&subject_path, |name| {
            name.starts_with("ses-") && session_filter.map_or(true, |f| f == name)
        }) {
            for (run_id, run_path) in subdirectories(&session_path, |_| true) {
                runs.push(Run::new(&subject_id, &session_id, &run_id, run_path));
            }
        }
    }

    runs.sort();
    tracing::info!(root = %root.display(), count = runs.len(), "Discovered raw runs");
    Ok(runs)
}

/// Scans an output root and enumerates runs with completed outputs: a
/// provenance record plus a final recording, in the same lexicographic order
/// as [`discover`].
///
/// This is a presence check over the output tree; whether a record matches a
/// particular configuration is the pipeline's concern. Each returned [`Run`]
/// points at its directory under `output_root`.
pub fn discover_processed(
    output_root: &Path,
    subject_filter: Option<&str>,
    session_filter: Option<&str>,
) -> Result<Vec<Run>, DiscoveryError> {
    if !output_root.exists() {
        return Err(DiscoveryError::RootNotFound(
            output_root.display().to_string(),
        ));
    }
    fs::read_dir(output_root).map_err(|source| DiscoveryError::RootUnreadable {
        path: output_root.display().to_string(),
        source,
    })?;

    let mut runs = Vec::new();
    for (subject_id, subject_path) in subdirectories(output_root, |name| {
        name.starts_with("sub-") && subject_filter.map_or(true, |f| f == name)
    }) {
        for (session_id, session_path) in subdirectories(&subject_path, |name| {
            name.starts_with("ses-") && session_filter.map_or(true, |f| f == name)
        }) {
            for (run_id, run_path) in subdirectories(&session_path, |_| true) {
                let has_provenance = run_path.join(PROVENANCE_FILE).is_file();
                let has_final = run_path.join(FINAL_DIR).join(RECORDING_FILE_NAME).is_file();
                if has_provenance && has_final {
                    runs.push(Run::new(&subject_id, &session_id, &run_id, run_path));
                }
            }
        }
    }

    runs.sort();
    tracing::info!(root = %output_root.display(), count = runs.len(), "Found processed runs");
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn mkdirs(root: &Path, rel: &str) {
        fs::create_dir_all(root.join(rel)).unwrap();
    }

    #[test]
    fn test_discover_lexicographic_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        mkdirs(root, "sub-01/ses-02/run-01");
        mkdirs(root, "sub-01/ses-01/run-02");
        mkdirs(root, "sub-01/ses-01/run-01");

        let runs = discover(root, None, None).unwrap();
        let keys: Vec<String> = runs.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "sub-01/ses-01/run-01",
                "sub-01/ses-01/run-02",
                "sub-01/ses-02/run-01",
            ]
        );
    }

    #[test]
    fn test_discover_skips_non_matching_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        mkdirs(root, "sub-01/ses-01/run-01");
        mkdirs(root, "derivatives/ses-01/run-01");
        mkdirs(root, "sub-02/notes");
        fs::write(root.join("README.txt"), "not a subject").unwrap();

        let runs = discover(root, None, None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].to_string(), "sub-01/ses-01/run-01");
    }

    #[test]
    fn test_discover_is_stable() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        mkdirs(root, "sub-01/ses-01/run-01");
        mkdirs(root, "sub-01/ses-01/run-02");
        mkdirs(root, "sub-02/ses-01/run-01");

        let first = discover(root, None, None).unwrap();
        let second = discover(root, None, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_discover_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        mkdirs(root, "sub-01/ses-01/run-01");
        mkdirs(root, "sub-01/ses-02/run-01");
        mkdirs(root, "sub-02/ses-01/run-01");

        let runs = discover(root, Some("sub-01"), Some("ses-02")).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].to_string(), "sub-01/ses-02/run-01");
    }

    #[test]
    fn test_discover_processed_requires_both_artifacts() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        // run-01 is complete, run-02 has only provenance, run-03 has only a
        // final recording.
        mkdirs(root, "sub-01/ses-01/run-01/final");
        fs::write(root.join("sub-01/ses-01/run-01/provenance.json"), "{}").unwrap();
        fs::write(root.join("sub-01/ses-01/run-01/final/recording.json"), "{}").unwrap();
        mkdirs(root, "sub-01/ses-01/run-02");
        fs::write(root.join("sub-01/ses-01/run-02/provenance.json"), "{}").unwrap();
        mkdirs(root, "sub-01/ses-01/run-03/final");
        fs::write(root.join("sub-01/ses-01/run-03/final/recording.json"), "{}").unwrap();

        let runs = discover_processed(root, None, None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].to_string(), "sub-01/ses-01/run-01");
    }

    #[test]
    fn test_discover_processed_filters_subject() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for subject in ["sub-01", "sub-02"] {
            let run = format!("{}/ses-01/run-01", subject);
            mkdirs(root, &format!("{}/final", run));
            fs::write(root.join(&run).join("provenance.json"), "{}").unwrap();
            fs::write(root.join(&run).join("final/recording.json"), "{}").unwrap();
        }

        let runs = discover_processed(root, Some("sub-02"), None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].subject_id, "sub-02");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("nope"), None, None).unwrap_err();
        assert!(matches!(err, DiscoveryError::RootNotFound(_)));
    }
}
