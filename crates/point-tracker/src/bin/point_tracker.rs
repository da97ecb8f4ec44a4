use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::info;
use point_tracker::core::{CancelToken, DataError, Dataset, PointId, RunOutcome};
use point_tracker::io::{GrowthReport, ProjectConfig, ProjectIoError};
use point_tracker::project::{self, ProjectError};
use point_tracker::tracking::PropagationRequest;

#[derive(Debug, Parser)]
#[command(
    name = "point-tracker",
    version,
    about = "Track cell outlines through microscopy time series and measure their growth"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit JSON logs through tracing instead of the plain stderr logger.
    /// Only honoured when built with the `tracing` feature.
    #[arg(long, global = true)]
    json_log: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Propagate points through the project images and write the updated dataset.
    Track(TrackArgs),
    /// Compute cell growth and write a JSON report.
    Growth(GrowthArgs),
    /// Solve the image alignment and write the registered dataset.
    Align(ConfigArgs),
    /// Report cell invariant violations of a dataset file.
    Check {
        dataset: PathBuf,
    },
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Project config (JSON).
    config: PathBuf,
    /// Output path, overriding the config.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TrackArgs {
    #[command(flatten)]
    project: ConfigArgs,
    /// Frame the positions are read from. Defaults to the first frame.
    #[arg(long)]
    start: Option<String>,
    /// Frames to visit, in order. Defaults to every frame after the start.
    #[arg(long, value_delimiter = ',')]
    frames: Vec<String>,
    /// Points to track. Defaults to every point of the start frame.
    #[arg(long, value_delimiter = ',')]
    points: Vec<PointId>,
}

#[derive(Debug, Args)]
struct GrowthArgs {
    #[command(flatten)]
    project: ConfigArgs,
    /// Frames to measure, in order. Defaults to every frame.
    #[arg(long, value_delimiter = ',')]
    frames: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Io(#[from] ProjectIoError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0} cell invariant violations")]
    Violations(usize),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.json_log {
        point_tracker::core::init_tracing(true);
        return;
    }
    let _ = point_tracker::core::init_with_level(point_tracker::core::level_from_verbosity(cli.verbose));
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    if cli.json_log {
        eprintln!("warning: --json-log needs the `tracing` feature, using plain logs");
    }
    let _ = point_tracker::core::init_with_level(point_tracker::core::level_from_verbosity(cli.verbose));
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Track(args) => track(args),
        Command::Growth(args) => growth(args),
        Command::Align(args) => align(args),
        Command::Check { dataset } => check(&dataset),
    }
}

fn load(args: &ConfigArgs) -> Result<(ProjectConfig, Dataset), CliError> {
    let cfg = ProjectConfig::load_json(&args.config)?;
    let data = cfg.load_dataset()?;
    info!(
        "loaded {} ({} frames, {} cells)",
        cfg.dataset_path.display(),
        data.nb_frames(),
        data.cells().count()
    );
    Ok((cfg, data))
}

fn output(args: &ConfigArgs, cfg: &ProjectConfig, default_name: &str) -> PathBuf {
    args.output
        .clone()
        .unwrap_or_else(|| cfg.output_path(default_name))
}

fn track(args: TrackArgs) -> Result<(), CliError> {
    let (cfg, data) = load(&args.project)?;
    let start = match &args.start {
        Some(name) => data.frame_index(name)?,
        None => 0,
    };
    let frames = if args.frames.is_empty() {
        (start + 1..data.nb_frames()).collect()
    } else {
        project::resolve_frames(&data, &args.frames)?
    };
    let request = PropagationRequest {
        start,
        frames,
        points: (!args.points.is_empty()).then_some(args.points),
    };
    let (data, outcome) = project::track(&cfg, data, request, CancelToken::new())?;
    let out = output(&args.project, &cfg, "tracked.json");
    data.write_json(&out)?;
    let complete = matches!(outcome, RunOutcome::Completed(_));
    let summary = outcome.into_inner();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("wrote {} (complete: {complete})", out.display());
    Ok(())
}

fn growth(args: GrowthArgs) -> Result<(), CliError> {
    let (cfg, data) = load(&args.project)?;
    let frames = project::resolve_frames(&data, &args.frames)?;
    let outcome = project::growth(&cfg, data, frames, CancelToken::new())?;
    let complete = !outcome.is_aborted();
    let report = GrowthReport::new(&cfg.dataset_path, outcome.into_inner(), complete);
    let out = output(&args.project, &cfg, "growth.json");
    report.write_json(&out)?;
    println!(
        "{} cell measurements over {} frame pairs written to {}",
        report.result.nb_measurements(),
        report.result.frames.len(),
        out.display()
    );
    Ok(())
}

fn align(args: ConfigArgs) -> Result<(), CliError> {
    let (cfg, mut data) = load(&args)?;
    let solution = project::align(&cfg, &mut data)?;
    let out = output(&args, &cfg, "aligned.json");
    data.write_json(&out)?;
    println!("{}", serde_json::to_string_pretty(&solution)?);
    Ok(())
}

fn check(path: &Path) -> Result<(), CliError> {
    let data = Dataset::load_json(path)?;
    let violations = data.check_cells();
    if violations.is_empty() {
        println!(
            "ok: {} frames, {} cells",
            data.nb_frames(),
            data.cells().count()
        );
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&violations)?);
    Err(CliError::Violations(violations.len()))
}
