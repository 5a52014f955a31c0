use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One raw recording unit inside the subject/session hierarchy.
///
/// A run is the unit of processing: each run's pipeline executes in complete
/// isolation from every other run's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub subject_id: String,
    pub session_id: String,
    pub run_id: String,
    /// Directory holding the run's raw data.
    pub raw_path: PathBuf,
}

impl Run {
    pub fn new(
        subject_id: impl Into<String>,
        session_id: impl Into<String>,
        run_id: impl Into<String>,
        raw_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            session_id: session_id.into(),
            run_id: run_id.into(),
            raw_path: raw_path.into(),
        }
    }

    /// The lexicographic ordering key used everywhere a run sequence must be
    /// reproducible (discovery output, batch dispatch, summaries).
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.subject_id, &self.session_id, &self.run_id)
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject_id, self.session_id, self.run_id)
    }
}

impl PartialOrd for Run {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Run {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // raw_path breaks ties so ordering stays consistent with Eq.
        self.key()
            .cmp(&other.key())
            .then_with(|| self.raw_path.cmp(&other.raw_path))
    }
}
