//! route-skeleton CLI - extract a route skeleton from a fleet CSV export
//!
//! Usage:
//!   route-skeleton <input.csv> [--config <cfg.json>] [--output <out.json>]
//!                  [--snap] [--osrm-url <url>] [--target-points <n>] [--verbose]
//!
//! Writes the pipeline output (route, per-stage metrics, progress log) as
//! JSON to `--output`, or to stdout. Ctrl-C cancels in-flight road-matching
//! requests.

use clap::Parser;
use log::{info, warn};
use route_skeleton::{
    read_csv_file, CancelSignal, FieldMapping, OsrmMatcher, PipelineConfig, Result,
    RoutePipeline, DEFAULT_OSRM_URL,
};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "route-skeleton")]
#[command(
    about = "Extract a canonical route skeleton and virtual stops from GPS pings",
    long_about = None
)]
struct Cli {
    /// CSV export with a header row
    input: PathBuf,

    /// Pipeline configuration JSON (missing options use defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Snap the route to roads with OSRM
    #[arg(long)]
    snap: bool,

    /// OSRM server used for snapping
    #[arg(long, default_value = DEFAULT_OSRM_URL)]
    osrm_url: String,

    /// Override simplify.targetPoints
    #[arg(long)]
    target_points: Option<usize>,

    /// Enable verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if cli.snap {
        config.snap.enabled = true;
    }
    if let Some(target) = cli.target_points {
        config.simplify.target_points = target;
    }
    let pipeline = RoutePipeline::new(config)?;

    let (records, report) = read_csv_file(&cli.input, &FieldMapping::default())?;
    info!(
        "Loaded {} records from {} ({} rows, {} out of range)",
        records.len(),
        cli.input.display(),
        report.rows,
        report.out_of_range
    );

    let output = if pipeline.config().snap.enabled {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let matcher = OsrmMatcher::for_snap(&cli.osrm_url, &pipeline.config().snap)?;
        let cancel = CancelSignal::new();

        let on_interrupt = cancel.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling road matching");
                on_interrupt.cancel();
            }
        });

        runtime.block_on(pipeline.run_with_road_matcher(records, &matcher, &cancel))?
    } else {
        pipeline.run(records)
    };

    let json = output.to_json()?;
    match &cli.output {
        Some(path) => {
            fs::write(path, json)?;
            info!(
                "Wrote {} skeleton points and {} virtual stops to {}",
                output.route.skeleton.len(),
                output.route.virtual_stops.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
