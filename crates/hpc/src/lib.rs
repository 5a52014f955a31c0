//! SLURM job dispatch for spikeprep.
//!
//! Turns a discovered batch into one scheduler job per run: a JSON job
//! descriptor plus a generated sbatch script, submitted through a pluggable
//! submitter so tests never need a real scheduler.

pub mod descriptor;
pub mod dispatch;
pub mod options;

pub use descriptor::JobDescriptor;
pub use dispatch::{
    DispatchError, HpcJobDispatcher, JobSubmitter, SbatchSubmitter, SubmissionReport,
};
pub use options::{SlurmOptions, SlurmOptionsOverrides};
