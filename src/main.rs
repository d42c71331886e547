// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dipole_semblance::core::Rotation;
use dipole_semblance::io;
use dipole_semblance::kernels::{Normalization, ObservedBounds};
use dipole_semblance::scheduler::{ProgressInfo, SemblanceSolver, Strategy};
use dipole_semblance::survey::{self, DipoleSource, Scenario, SourceId};

#[derive(Parser)]
#[command(
    name = "dipole-semblance",
    about = "Locate buried magnetic dipoles by semblance inversion of survey data"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score every voxel of the search volume against a survey
    Invert(InvertArgs),
    /// Generate a synthetic survey from buried sources
    Simulate(SimulateArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Sequential,
    DataParallel,
}

#[derive(Clone, Copy, ValueEnum)]
enum NormalizationArg {
    MinMax,
    PeakOnly,
}

#[derive(Args)]
struct InvertArgs {
    /// Survey file (.json request or .mat with scan_pts/scan_vals)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Lowest candidate z (required for .mat input, overrides .json)
    #[arg(long, allow_hyphen_values = true, requires = "z_max")]
    z_min: Option<i64>,

    /// Highest candidate z
    #[arg(long, allow_hyphen_values = true, requires = "z_min")]
    z_max: Option<i64>,

    /// Output file path (.npy, .json or .mat)
    #[arg(short = 'o', long, default_value = "semblance.npy")]
    output: PathBuf,

    /// Voxel scheduling strategy
    #[arg(long, value_enum, default_value = "sequential")]
    strategy: StrategyArg,

    /// Scaling applied to simulated samples
    #[arg(long, value_enum, default_value = "min-max")]
    normalization: NormalizationArg,

    /// Number of Rayon worker threads (data-parallel only)
    #[arg(long)]
    threads: Option<usize>,

    /// Launch block size, comma-separated (e.g., 8,8,8)
    #[arg(long)]
    launch_block: Option<String>,

    /// Rotation of candidate positions in radians (sequential only)
    #[arg(long, allow_hyphen_values = true)]
    rotation_angle: Option<f64>,

    /// Rotation center, comma-separated x,y
    #[arg(long, allow_hyphen_values = true, default_value = "0,0")]
    rotation_center: String,

    /// Override the observed normalization bounds, comma-separated min,max
    #[arg(long, allow_hyphen_values = true)]
    observed_bounds: Option<String>,

    /// Print scoring progress to stderr (see --progress-interval)
    #[arg(long)]
    progress: bool,

    /// Progress reporting interval in milliseconds (used with --progress)
    #[arg(long, default_value = "500")]
    progress_interval: u64,
}

#[derive(Args)]
struct SimulateArgs {
    /// Scan pattern: "grid:<x0>,<x1>,<y0>,<y1>,<step>",
    /// "spiral:<cx>,<cy>,<line_dist>,<num_lines>,<angle_res>", or
    /// "strip:<x>,<y>,<length>,<strips_dist>,<num_strips>,<sample_dist>"
    #[arg(long, allow_hyphen_values = true)]
    pattern: String,

    /// Source as "x,y,depth,moment" (repeatable)
    #[arg(long, num_args = 1, allow_hyphen_values = true)]
    source: Vec<String>,

    /// Lowest candidate z written into the request
    #[arg(long, allow_hyphen_values = true, default_value = "-10")]
    z_min: i64,

    /// Highest candidate z written into the request
    #[arg(long, allow_hyphen_values = true, default_value = "-1")]
    z_max: i64,

    /// Output file path (.json or .mat)
    #[arg(short = 'o', long, default_value = "survey.json")]
    output: PathBuf,
}

fn parse_floats(s: &str, expected: usize, what: &str) -> Result<Vec<f64>> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected comma-separated numbers", what))?;
    if parts.len() != expected {
        bail!(
            "{} has {} components, expected {}",
            what,
            parts.len(),
            expected
        );
    }
    Ok(parts)
}

fn parse_block(s: &str) -> Result<[usize; 3]> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("invalid --launch-block: expected comma-separated integers")?;
    match parts.as_slice() {
        &[bx, by, bz] => Ok([bx, by, bz]),
        _ => bail!("--launch-block has {} components, expected 3", parts.len()),
    }
}

fn axis_positions(lo: f64, hi: f64, step: f64) -> Result<Vec<f64>> {
    if !step.is_finite() || step <= 0.0 || hi < lo {
        bail!("grid pattern needs step > 0 and x0 <= x1, y0 <= y1");
    }
    let n = ((hi - lo) / step).floor() as usize + 1;
    Ok((0..n).map(|i| lo + i as f64 * step).collect())
}

fn build_scan_path(pattern: &str) -> Result<Vec<[f64; 2]>> {
    if let Some(params) = pattern.strip_prefix("grid:") {
        let p = parse_floats(params, 5, "grid pattern")?;
        let xs = axis_positions(p[0], p[1], p[4])?;
        let ys = axis_positions(p[2], p[3], p[4])?;
        return Ok(survey::grid_scan(&xs, &ys));
    }

    if let Some(params) = pattern.strip_prefix("spiral:") {
        let p = parse_floats(params, 5, "spiral pattern")?;
        return Ok(survey::spiral_scan(
            [p[0], p[1]],
            p[2],
            p[3] as usize,
            p[4],
        )?);
    }

    if let Some(params) = pattern.strip_prefix("strip:") {
        let p = parse_floats(params, 6, "strip pattern")?;
        return Ok(survey::strip_scan(
            [p[0], p[1]],
            p[2],
            p[3],
            p[4] as usize,
            p[5],
        )?);
    }

    bail!(
        "unknown --pattern: '{}'. Expected 'grid:…', 'spiral:…', or 'strip:…'",
        pattern
    );
}

fn progress_callback(interval_ms: u64) -> (Duration, Box<dyn Fn(ProgressInfo) + Send + Sync>) {
    let callback: Box<dyn Fn(ProgressInfo) + Send + Sync> = Box::new(move |info: ProgressInfo| {
        eprintln!(
            "[{:.1}s] voxels={}/{}",
            info.elapsed.as_secs_f64(),
            info.voxels_processed,
            info.total_voxels,
        );
    });
    (Duration::from_millis(interval_ms), callback)
}

fn run_invert(args: &InvertArgs) -> Result<()> {
    let z_range = args.z_min.zip(args.z_max);
    let request = io::load_survey(&args.input, z_range)
        .with_context(|| format!("failed to load survey from {}", args.input.display()))?;

    let mut solver: SemblanceSolver = request.into_solver()?;
    solver = solver
        .with_strategy(match args.strategy {
            StrategyArg::Sequential => Strategy::Sequential,
            StrategyArg::DataParallel => Strategy::DataParallel,
        })
        .with_normalization(match args.normalization {
            NormalizationArg::MinMax => Normalization::MinMax,
            NormalizationArg::PeakOnly => Normalization::PeakOnly,
        });

    if let Some(threads) = args.threads {
        solver = solver.with_threads(threads);
    }
    if let Some(block) = &args.launch_block {
        solver = solver.with_launch_block(parse_block(block)?)?;
    }
    if let Some(angle) = args.rotation_angle {
        let c = parse_floats(&args.rotation_center, 2, "--rotation-center")?;
        solver = solver.with_rotation(Rotation {
            angle,
            center: [c[0], c[1]],
        });
    }
    if let Some(bounds) = &args.observed_bounds {
        let b = parse_floats(bounds, 2, "--observed-bounds")?;
        solver = solver.with_observed_bounds(ObservedBounds {
            min: b[0],
            max: b[1],
        });
    }
    if args.progress {
        let (interval, callback) = progress_callback(args.progress_interval);
        solver = solver.with_progress(interval, callback);
    }

    let inversion = solver.solve()?;
    io::save_volume(&inversion.volume, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    match inversion.volume.best_voxel() {
        Some((idx, score)) => {
            let loc = solver.grid().location(idx);
            println!(
                "best voxel {:?} at ({}, {}, {}) semblance={:.6}",
                idx, loc[0], loc[1], loc[2], score
            );
        }
        None => println!("no voxel could be scored"),
    }
    if !inversion.report.faults.is_empty() {
        println!(
            "{} of {} voxels faulted (stored as NaN)",
            inversion.report.faults.len(),
            solver.grid().num_voxels()
        );
    }
    Ok(())
}

fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let path = build_scan_path(&args.pattern)?;
    let mut scenario = Scenario::new(&path)?;

    for (i, src) in args.source.iter().enumerate() {
        let p = parse_floats(src, 4, "--source")?;
        scenario.add_source(
            SourceId(i as u64),
            DipoleSource {
                position: [p[0], p[1]],
                depth: p[2],
                moment: p[3],
            },
        );
    }

    let request = scenario.to_request(args.z_min, args.z_max)?;
    info!(
        scan_points = request.scan_pts.len(),
        sources = args.source.len(),
        grid_range = ?request.grid_range,
        "simulated survey"
    );
    io::save_survey(&request, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Invert(args) => run_invert(args),
        Command::Simulate(args) => run_simulate(args),
    }
}
