//! `rockhound` – headless rover runner.
//!
//! This binary drives the full perception and decision stack against the
//! in-process simulator.  It:
//!
//! 1. Initialises tracing (console, optional OTLP export).
//! 2. Loads `~/.rockhound/config.toml` (or `--config <path>`) and applies
//!    `ROCKHOUND_*` environment overrides.
//! 3. Runs the control loop for the configured number of ticks on simulated
//!    time, printing a status line per second or a JSON line per tick
//!    (`--json`).
//! 4. Intercepts **Ctrl-C** to stop after the current tick and print the run
//!    summary.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use rockhound_hal::{SimRover, TelemetrySource};
use rockhound_perception::Layer;
use rockhound_runtime::{ControlLoop, TickReport};
use rockhound_types::{Mode, RoverError};
use tracing::{info, warn};

const USAGE: &str = "\
Usage: rockhound [OPTIONS]

Options:
  --config <PATH>   Config file (default ~/.rockhound/config.toml)
  --ticks <N>       Number of control ticks to run
  --json            Print one JSON report per tick instead of status lines
  --init            Write the default config to the config path and exit
  -h, --help        Show this help";

/// Parsed command-line flags.
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    ticks: Option<u64>,
    json: bool,
    init: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let path = it.next().ok_or("--config needs a path")?;
                out.config = Some(PathBuf::from(path));
            }
            "--ticks" => {
                let n = it.next().ok_or("--ticks needs a number")?;
                out.ticks = Some(n.parse().map_err(|_| format!("invalid tick count: {n}"))?);
            }
            "--json" => out.json = true,
            "--init" => out.init = true,
            "-h" | "--help" => out.help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(out)
}

fn main() -> ExitCode {
    let _guard = rockhound_runtime::init_tracing("rockhound");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}: {}\n\n{}", "error".red().bold(), e, USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let path = args.config.clone().unwrap_or_else(config::config_path);
    if args.init {
        return match config::save_to(&config::Config::default(), &path) {
            Ok(()) => {
                println!(
                    "  {} Config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    if !args.json {
        print_banner();
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping after this tick …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run can only end by tick count");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            if !args.json {
                println!("  Config loaded from {}", path.display().to_string().bold());
            }
            cfg
        }
        Ok(None) => config::Config::default(),
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config::apply_env_overrides(&mut cfg) {
        eprintln!("{}: {}", "Config error".red(), e);
        return ExitCode::FAILURE;
    }
    if let Some(ticks) = args.ticks {
        cfg.ticks = ticks;
    }

    match run(&cfg, args.json, &shutdown) {
        Ok(summary) => {
            print_summary(&summary, args.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Run aborted".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

/// End-of-run statistics.
#[derive(Debug, serde::Serialize)]
struct Summary {
    ticks: u64,
    simulated_secs: f64,
    collected: usize,
    samples_left: usize,
    final_mode: Mode,
    navigable_cells: usize,
    obstacle_cells: usize,
    sample_cells: usize,
}

fn run(cfg: &config::Config, json: bool, shutdown: &AtomicBool) -> Result<Summary, RoverError> {
    cfg.validate()?;

    let mut rover = cfg
        .samples
        .iter()
        .fold(SimRover::new(cfg.sim.clone()).at(cfg.start_pose()), |r, [x, y]| {
            r.with_sample(*x, *y)
        });

    // Simulated clock: the loop sees time advance by `sim.dt` per tick.
    let start = Instant::now();
    let mut control = ControlLoop::new(cfg.perception.clone(), cfg.drive.clone(), start)?
        .with_initial_mode(cfg.initial_mode);
    let status_every = (1.0 / cfg.sim.dt).round().max(1.0) as u64;

    info!(ticks = cfg.ticks, samples = cfg.samples.len(), "run started");
    for _ in 0..cfg.ticks {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let now = start + Duration::from_secs_f64(rover.elapsed());
        let report = control.run_step(&mut rover, now)?;

        if json {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialise tick report"),
            }
        } else if report.send_pickup || report.tick % status_every == 0 {
            print_status(&report);
        }
    }

    let map = control.world_map();
    let summary = Summary {
        ticks: control.ticks(),
        simulated_secs: rover.elapsed(),
        collected: rover.collected(),
        samples_left: rover.samples_remaining(),
        final_mode: control.state().mode,
        navigable_cells: map.coverage(Layer::Navigable),
        obstacle_cells: map.coverage(Layer::Obstacle),
        sample_cells: map.coverage(Layer::Sample),
    };
    info!(
        ticks = summary.ticks,
        collected = summary.collected,
        velocity = rover.telemetry().velocity,
        "run finished"
    );
    Ok(summary)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn mode_label(mode: Mode) -> colored::ColoredString {
    let label = format!("{:<15}", mode.as_str());
    match mode {
        Mode::Forward => label.green(),
        Mode::Stop => label.red(),
        Mode::FaceSample => label.yellow(),
        Mode::ApproachSample => label.cyan(),
    }
}

fn print_status(report: &TickReport) {
    println!(
        "  [{:>5}] {} x={:>7.2} y={:>7.2} yaw={:>6.1}  v={:>5.2}  thr={:>4.2} brk={:>4.1} steer={:>6.2}  nav={:>5}{}{}",
        report.tick,
        mode_label(report.mode),
        report.pose.x,
        report.pose.y,
        report.pose.yaw,
        report.velocity,
        report.throttle,
        report.brake,
        report.steer,
        report.nav_pixels,
        if report.sample_visible { "  sample in view".yellow().to_string() } else { String::new() },
        if report.send_pickup { "  PICKUP".green().bold().to_string() } else { String::new() },
    );
}

fn print_summary(summary: &Summary, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(summary) {
            eprintln!("{line}");
        }
        return;
    }
    println!();
    println!("{}", "  Run summary".bold());
    println!("    ticks            {} ({:.1} s simulated)", summary.ticks, summary.simulated_secs);
    println!(
        "    samples          {} collected, {} left",
        summary.collected.to_string().green().bold(),
        summary.samples_left
    );
    println!("    final mode       {}", summary.final_mode);
    println!(
        "    mapped cells     {} navigable, {} obstacle, {} sample",
        summary.navigable_cells, summary.obstacle_cells, summary.sample_cells
    );
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___           __    __                          __"#.bold().cyan());
    println!("{}", r#"  / _ \___  ____/ /__ / /  ___  __ _____  ___  ___/ /"#.bold().cyan());
    println!("{}", r#" / , _/ _ \/ __/  '_// _ \/ _ \/ // / _ \/ _ \/ _  / "#.bold().cyan());
    println!("{}", r#"/_/|_|\___/\__/_/\_\/_//_/\___/\_,_/_//_/\___/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "rockhound".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Autonomous sample-return rover");
    println!();
}
