//! Per-run execution state machine and batch driver.
//!
//! One run moves `Pending -> Running -> Completed | StepFailed`. A step
//! failure (including a panic inside a step) is contained to its run: the
//! provenance record is still written and sibling runs in the same batch are
//! unaffected. Completed runs persist their final recording and provenance
//! atomically with respect to the skip check, so a rerun with the same
//! resolved configuration is a no-op unless forced.

use crate::config::ResolvedConfig;
use crate::error::PipelineError;
use crate::provenance::Provenance;
use crate::registry::StepRegistry;
use ephys_types::{Recording, Run};
use session::{read_recording, write_recording, OutputPathManager, RecordingLoader};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of one run inside the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Pending,
    Running { step_index: usize },
    StepFailed { step_index: usize, error: String },
    Completed,
}

/// Result of driving a single run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Stored provenance already matches this configuration.
    Skipped,
    Executed {
        state: PipelineState,
        provenance: Provenance,
        /// The last successfully produced recording: the final output when
        /// completed, the failing step's input otherwise.
        recording: Recording,
    },
}

/// Per-run entry in a batch report.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Skipped,
    StepFailed { step: String, error: String },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: String,
    pub status: RunStatus,
    pub duration_secs: f64,
}

/// Outcome of a whole batch, one report per requested run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<RunReport>,
}

impl BatchSummary {
    /// True when every run either completed now or was already up to date.
    pub fn all_completed(&self) -> bool {
        self.reports
            .iter()
            .all(|r| matches!(r.status, RunStatus::Completed | RunStatus::Skipped))
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunReport> {
        self.reports
            .iter()
            .filter(|r| !matches!(r.status, RunStatus::Completed | RunStatus::Skipped))
    }
}

/// Drives resolved configurations over runs and persists the results.
pub struct PreprocessingPipeline {
    registry: Arc<StepRegistry>,
    paths: OutputPathManager,
    force: bool,
    cancel: Arc<AtomicBool>,
}

impl PreprocessingPipeline {
    pub fn new(registry: Arc<StepRegistry>, paths: OutputPathManager) -> Self {
        Self {
            registry,
            paths,
            force: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reprocess runs even when stored provenance already matches.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Shared flag a signal handler can set to stop between steps.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// True when a stored provenance record matches `config` exactly and the
    /// final recording is still on disk.
    pub fn already_processed(&self, run: &Run, config: &ResolvedConfig) -> bool {
        let provenance_path = self.paths.provenance_path(run);
        let stored = match Provenance::load(&provenance_path) {
            Ok(stored) => stored,
            Err(_) => return false,
        };
        if !stored.all_succeeded() || stored.canonical() != Provenance::expected_for(config) {
            return false;
        }
        read_recording(&self.paths.path_for(run, None)).is_ok()
    }

    /// Runs the configured step sequence over one loaded recording.
    ///
    /// Steps are instantiated up front, so a configuration problem surfaces
    /// before any sample is touched. Each step executes under a panic guard;
    /// a failing step ends the run in `StepFailed`, with the provenance
    /// record written either way.
    pub fn run(
        &self,
        run: &Run,
        recording: Recording,
        config: &ResolvedConfig,
    ) -> Result<RunOutcome, PipelineError> {
        if !self.force && self.already_processed(run, config) {
            tracing::info!(run = %run, "Provenance up to date, skipping");
            return Ok(RunOutcome::Skipped);
        }

        let mut steps = Vec::with_capacity(config.steps().len());
        for entry in config.steps() {
            steps.push(self.registry.create(&entry.name, &entry.params)?);
        }

        let mut state = PipelineState::Pending;
        let mut provenance = Provenance::new(run.to_string());
        let mut current = recording;

        for (index, (entry, step)) in config.steps().iter().zip(&steps).enumerate() {
            state = PipelineState::Running { step_index: index };

            if self.cancel.load(Ordering::Relaxed) {
                let error = "cancelled".to_string();
                provenance.record(&entry.name, &entry.params, 0.0, Err(error.clone()));
                state = PipelineState::StepFailed {
                    step_index: index,
                    error,
                };
                break;
            }

            tracing::info!(run = %run, step = %entry.name, "Applying step");
            let started = Instant::now();
            // The input is cloned so a failing step cannot destroy the output
            // of its predecessor.
            let input = current.clone();
            let result = catch_unwind(AssertUnwindSafe(|| step.apply(input)));
            let duration = started.elapsed().as_secs_f64();

            match result {
                Ok(Ok(output)) => {
                    provenance.record(&entry.name, &entry.params, duration, Ok(()));
                    current = output;
                }
                Ok(Err(err)) => {
                    let error = err.to_string();
                    tracing::warn!(run = %run, step = %entry.name, %error, "Step failed");
                    provenance.record(&entry.name, &entry.params, duration, Err(error.clone()));
                    state = PipelineState::StepFailed {
                        step_index: index,
                        error,
                    };
                    break;
                }
                Err(panic) => {
                    let error = match panic.downcast_ref::<&str>() {
                        Some(s) => s.to_string(),
                        None => match panic.downcast_ref::<String>() {
                            Some(s) => s.clone(),
                            None => "step panicked".to_string(),
                        },
                    };
                    tracing::error!(run = %run, step = %entry.name, %error, "Step panicked");
                    provenance.record(&entry.name, &entry.params, duration, Err(error.clone()));
                    state = PipelineState::StepFailed {
                        step_index: index,
                        error,
                    };
                    break;
                }
            }
        }

        if matches!(state, PipelineState::Running { .. }) {
            state = PipelineState::Completed;
        }

        if state == PipelineState::Completed {
            let final_dir = self.paths.prepare(&self.paths.path_for(run, None))?;
            write_recording(&final_dir, &current)?;
        }

        // Provenance is written for failures too; a partial record never
        // matches the expected canonical form, so failed runs are retried.
        self.paths.prepare(&self.paths.run_dir(run))?;
        provenance.write(&self.paths.provenance_path(run))?;

        Ok(RunOutcome::Executed {
            state,
            provenance,
            recording: current,
        })
    }

    fn process_one(
        &self,
        run: &Run,
        config: &ResolvedConfig,
        loader: &dyn RecordingLoader,
    ) -> RunReport {
        let started = Instant::now();

        let status = if !self.force && self.already_processed(run, config) {
            RunStatus::Skipped
        } else {
            match loader.load(run) {
                Err(err) => RunStatus::Failed(err.to_string()),
                Ok(recording) => match self.run(run, recording, config) {
                    Ok(RunOutcome::Skipped) => RunStatus::Skipped,
                    Ok(RunOutcome::Executed {
                        state, provenance, ..
                    }) => match state {
                        PipelineState::Completed => RunStatus::Completed,
                        PipelineState::StepFailed { step_index, error } => {
                            let step = provenance
                                .entries
                                .get(step_index)
                                .map(|e| e.step_name.clone())
                                .unwrap_or_default();
                            RunStatus::StepFailed { step, error }
                        }
                        other => RunStatus::Failed(format!("unexpected state: {:?}", other)),
                    },
                    Err(err) => RunStatus::Failed(err.to_string()),
                },
            }
        };

        RunReport {
            run: run.to_string(),
            status,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Processes a batch of runs, `jobs` at a time. Failures never cross run
    /// boundaries; the summary carries one report per run, sorted by run key.
    pub fn run_batch(
        &self,
        runs: &[Run],
        config: &ResolvedConfig,
        loader: &dyn RecordingLoader,
        jobs: usize,
    ) -> BatchSummary {
        let jobs = jobs.max(1).min(runs.len().max(1));
        tracing::info!(runs = runs.len(), jobs, "Starting batch");

        let mut reports: Vec<RunReport> = if jobs == 1 {
            runs.iter()
                .map(|run| self.process_one(run, config, loader))
                .collect()
        } else {
            let (work_tx, work_rx) = flume::unbounded::<&Run>();
            for run in runs {
                let _ = work_tx.send(run);
            }
            drop(work_tx);

            let (report_tx, report_rx) = flume::unbounded::<RunReport>();
            std::thread::scope(|scope| {
                for _ in 0..jobs {
                    let work_rx = work_rx.clone();
                    let report_tx = report_tx.clone();
                    scope.spawn(move || {
                        while let Ok(run) = work_rx.recv() {
                            let _ = report_tx.send(self.process_one(run, config, loader));
                        }
                    });
                }
            });
            drop(report_tx);
            report_rx.into_iter().collect()
        };

        reports.sort_by(|a, b| a.run.cmp(&b.run));
        BatchSummary { reports }
    }
}
