//! spikeprep command-line interface.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ephys_types::Run;
use hpc::{HpcJobDispatcher, JobDescriptor, SbatchSubmitter, SlurmOptions, SlurmOptionsOverrides};
use pipeline::{
    available_presets, default_config, default_registry, load_config_file, preset, resolve,
    PipelineState, PreprocessingPipeline, ResolvedConfig, RunOutcome, RunStatus, StepRegistry,
};
use session::{
    discover, discover_processed, write_recording, JsonRecordingLoader, OutputPathManager,
    RecordingLoader, SyncChannelService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spikeprep", version, about = "Preprocessing orchestrator for extracellular electrophysiology recordings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Run selection: which part of the raw tree to operate on.
#[derive(Args)]
struct SelectArgs {
    /// Root of the raw subject/session/run tree.
    #[arg(long)]
    input_root: PathBuf,
    /// Restrict to one subject directory, e.g. sub-01.
    #[arg(long)]
    subject: Option<String>,
    /// Restrict to one session directory, e.g. ses-01.
    #[arg(long)]
    session: Option<String>,
}

/// Configuration layering: builtin default, optional preset, optional
/// override file.
#[derive(Args)]
struct ConfigArgs {
    /// Named preset layered over the builtin default.
    #[arg(long)]
    preset: Option<String>,
    /// JSON step-configuration file layered over default and preset.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct SlurmArgs {
    #[arg(long)]
    mem: Option<String>,
    #[arg(long)]
    cpus_per_task: Option<u32>,
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    partition: Option<String>,
    /// Comma-separated node exclude list.
    #[arg(long)]
    exclude: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported preprocessing steps and their parameter schemas.
    Steps,
    /// List available configuration presets.
    Presets,
    /// Print the resolved step configuration without executing anything.
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Enumerate raw runs under an input root.
    Discover {
        #[command(flatten)]
        select: SelectArgs,
    },
    /// List runs under an output root that already have completed outputs.
    ListProcessed {
        #[arg(long)]
        output_root: PathBuf,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Preprocess discovered runs locally.
    Run {
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        config: ConfigArgs,
        /// Output root for processed data and provenance.
        #[arg(long)]
        output_root: PathBuf,
        /// Number of runs to process concurrently.
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Reprocess even when stored provenance already matches.
        #[arg(long)]
        force: bool,
    },
    /// Execute one run from a job descriptor (used by generated job scripts).
    RunOne {
        #[arg(long)]
        descriptor: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Generate and submit one SLURM job per discovered run.
    Submit {
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        output_root: PathBuf,
        #[command(flatten)]
        slurm: SlurmArgs,
    },
    /// Sync-channel operations on one run.
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Print the sync channel samples, one per line.
    Extract {
        #[command(flatten)]
        select: SelectArgs,
        /// Run directory name, e.g. run-001.
        #[arg(long)]
        run: String,
    },
    /// Export the sync channel trace as a CSV artifact for plotting.
    Plot {
        #[command(flatten)]
        select: SelectArgs,
        #[arg(long)]
        output_root: PathBuf,
        #[arg(long)]
        run: String,
    },
    /// Write a copy of the raw recording with the sync channel zeroed.
    Silence {
        #[command(flatten)]
        select: SelectArgs,
        #[arg(long)]
        output_root: PathBuf,
        #[arg(long)]
        run: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spikeprep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Steps => steps(),
        Commands::Presets => presets(),
        Commands::ShowConfig { config } => show_config(&config),
        Commands::Discover { select } => discover_cmd(&select),
        Commands::ListProcessed {
            output_root,
            subject,
            session,
        } => list_processed(&output_root, subject.as_deref(), session.as_deref()),
        Commands::Run {
            select,
            config,
            output_root,
            jobs,
            force,
        } => run_cmd(&select, &config, &output_root, jobs, force),
        Commands::RunOne { descriptor, force } => run_one(&descriptor, force),
        Commands::Submit {
            select,
            config,
            output_root,
            slurm,
        } => submit(&select, &config, &output_root, &slurm),
        Commands::Sync { command } => match command {
            SyncCommands::Extract { select, run } => sync_extract(&select, &run),
            SyncCommands::Plot {
                select,
                output_root,
                run,
            } => sync_plot(&select, &output_root, &run),
            SyncCommands::Silence {
                select,
                output_root,
                run,
            } => sync_silence(&select, &output_root, &run),
        },
    }
}

fn resolve_config(registry: &StepRegistry, args: &ConfigArgs) -> anyhow::Result<ResolvedConfig> {
    let preset_config = args.preset.as_deref().map(preset).transpose()?;
    let overrides = args
        .config
        .as_deref()
        .map(load_config_file)
        .transpose()
        .with_context(|| "reading step configuration file")?;
    Ok(resolve(
        &default_config(),
        preset_config.as_ref(),
        overrides.as_ref(),
        registry,
    )?)
}

fn discover_runs(select: &SelectArgs) -> anyhow::Result<Vec<Run>> {
    let runs = discover(
        &select.input_root,
        select.subject.as_deref(),
        select.session.as_deref(),
    )?;
    if runs.is_empty() {
        bail!(
            "no runs found under {} with the given filters",
            select.input_root.display()
        );
    }
    Ok(runs)
}

fn steps() -> anyhow::Result<()> {
    let registry = default_registry();
    for descriptor in registry.descriptors() {
        println!("{}: {}", descriptor.name, descriptor.description);
        println!(
            "{}",
            serde_json::to_string_pretty(&descriptor.parameter_schema)?
        );
    }
    Ok(())
}

fn presets() -> anyhow::Result<()> {
    for name in available_presets() {
        println!("{}", name);
    }
    Ok(())
}

fn show_config(config: &ConfigArgs) -> anyhow::Result<()> {
    let registry = default_registry();
    let resolved = resolve_config(&registry, config)?;
    println!("{}", resolved.to_pretty_json()?);
    Ok(())
}

fn discover_cmd(select: &SelectArgs) -> anyhow::Result<()> {
    for run in discover_runs(select)? {
        println!("{}\t{}", run, run.raw_path.display());
    }
    Ok(())
}

fn list_processed(
    output_root: &Path,
    subject: Option<&str>,
    session: Option<&str>,
) -> anyhow::Result<()> {
    for run in discover_processed(output_root, subject, session)? {
        println!("{}", run);
    }
    Ok(())
}

fn run_cmd(
    select: &SelectArgs,
    config: &ConfigArgs,
    output_root: &Path,
    jobs: usize,
    force: bool,
) -> anyhow::Result<()> {
    let registry = Arc::new(default_registry());
    let resolved = resolve_config(&registry, config)?;
    let runs = discover_runs(select)?;

    let pipeline = PreprocessingPipeline::new(registry, OutputPathManager::new(output_root))
        .with_force(force);
    let summary = pipeline.run_batch(&runs, &resolved, &JsonRecordingLoader, jobs);

    for report in &summary.reports {
        let status = match &report.status {
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Skipped => "up to date".to_string(),
            RunStatus::StepFailed { step, error } => format!("failed at {}: {}", step, error),
            RunStatus::Failed(error) => format!("failed: {}", error),
        };
        println!("{}\t{}\t{:.2}s", report.run, status, report.duration_secs);
    }

    let failed = summary.failed().count();
    if failed > 0 {
        bail!("{} of {} runs failed", failed, summary.reports.len());
    }
    Ok(())
}

fn run_one(descriptor_path: &Path, force: bool) -> anyhow::Result<()> {
    let descriptor = JobDescriptor::load(descriptor_path)
        .with_context(|| format!("reading descriptor {}", descriptor_path.display()))?;

    let pipeline = PreprocessingPipeline::new(
        Arc::new(default_registry()),
        OutputPathManager::new(&descriptor.output_root),
    )
    .with_force(force);

    let recording = JsonRecordingLoader.load(&descriptor.run)?;
    match pipeline.run(&descriptor.run, recording, &descriptor.config)? {
        RunOutcome::Skipped => {
            println!("{}\tup to date", descriptor.run);
            Ok(())
        }
        RunOutcome::Executed { state, .. } => match state {
            PipelineState::Completed => {
                println!("{}\tcompleted", descriptor.run);
                Ok(())
            }
            PipelineState::StepFailed { step_index, error } => {
                bail!(
                    "{}: step {} failed: {}",
                    descriptor.run,
                    step_index,
                    error
                )
            }
            other => bail!("{}: unexpected final state {:?}", descriptor.run, other),
        },
    }
}

fn submit(
    select: &SelectArgs,
    config: &ConfigArgs,
    output_root: &Path,
    slurm: &SlurmArgs,
) -> anyhow::Result<()> {
    let registry = default_registry();
    let resolved = resolve_config(&registry, config)?;
    let runs = discover_runs(select)?;

    let overrides = SlurmOptionsOverrides {
        cpus_per_task: slurm.cpus_per_task,
        mem: slurm.mem.clone(),
        time: slurm.time.clone(),
        partition: slurm.partition.clone(),
        exclude: slurm.exclude.clone(),
    };
    let options = overrides.apply(&SlurmOptions::default());

    let dispatcher = HpcJobDispatcher::new(OutputPathManager::new(output_root), options);
    let reports = dispatcher.dispatch(&runs, &resolved, &SbatchSubmitter);

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(job_id) => println!("{}\tjob {}", report.run, job_id),
            Err(err) => {
                failed += 1;
                println!("{}\tsubmission failed: {}", report.run, err);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} submissions failed", failed, reports.len());
    }
    Ok(())
}

fn find_run(select: &SelectArgs, run_id: &str) -> anyhow::Result<Run> {
    let mut matches: Vec<Run> = discover_runs(select)?
        .into_iter()
        .filter(|r| r.run_id == run_id)
        .collect();
    if matches.len() > 1 {
        let keys: Vec<String> = matches.iter().map(|r| r.to_string()).collect();
        bail!(
            "run {} is ambiguous ({}); narrow the match with --subject/--session",
            run_id,
            keys.join(", ")
        );
    }
    matches
        .pop()
        .with_context(|| format!("run {} not found under the given filters", run_id))
}

fn sync_extract(select: &SelectArgs, run_id: &str) -> anyhow::Result<()> {
    let run = find_run(select, run_id)?;
    let recording = JsonRecordingLoader.load(&run)?;
    // Extraction needs no output tree; the path manager is only a service
    // dependency here.
    let service = SyncChannelService::new(OutputPathManager::new("."));
    for value in service.extract(&run, &recording)? {
        println!("{}", value);
    }
    Ok(())
}

fn sync_plot(select: &SelectArgs, output_root: &Path, run_id: &str) -> anyhow::Result<()> {
    let run = find_run(select, run_id)?;
    let recording = JsonRecordingLoader.load(&run)?;
    let service = SyncChannelService::new(OutputPathManager::new(output_root));
    let path = service.export_trace(&run, &recording)?;
    println!("{}", path.display());
    Ok(())
}

fn sync_silence(select: &SelectArgs, output_root: &Path, run_id: &str) -> anyhow::Result<()> {
    let run = find_run(select, run_id)?;
    let recording = JsonRecordingLoader.load(&run)?;
    let paths = OutputPathManager::new(output_root);
    let service = SyncChannelService::new(paths.clone());

    let silenced = service.silence(&run, recording)?;
    let dir = paths.prepare(&paths.sync_dir(&run))?;
    write_recording(&dir, &silenced)?;
    println!("{}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn select(root: &Path, subject: Option<&str>) -> SelectArgs {
        SelectArgs {
            input_root: root.to_path_buf(),
            subject: subject.map(String::from),
            session: None,
        }
    }

    #[test]
    fn test_find_run_rejects_ambiguous_run_id() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub-01/ses-01/run-001")).unwrap();
        fs::create_dir_all(dir.path().join("sub-02/ses-01/run-001")).unwrap();

        let err = find_run(&select(dir.path(), None), "run-001").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        // A subject filter disambiguates.
        let run = find_run(&select(dir.path(), Some("sub-02")), "run-001").unwrap();
        assert_eq!(run.subject_id, "sub-02");
    }

    #[test]
    fn test_find_run_unknown_id_errors() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub-01/ses-01/run-001")).unwrap();
        let err = find_run(&select(dir.path(), None), "run-009").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
