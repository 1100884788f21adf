// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use twinboard_config::WorldManifest;
use twinboard_core::channel::ChannelBackend;
use twinboard_core::World;

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Settle time for worlds without any timer to count on.
const UNCLOCKED_SETTLE: Duration = Duration::from_millis(100);

fn parse_byte(s: &str) -> Result<u8, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex byte '{}': {}", s, e));
    }
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => trimmed
            .parse()
            .map_err(|e| format!("Invalid byte '{}': {}", s, e)),
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "TwinBoard peripheral simulator", long_about = None)]
struct Cli {
    /// Enable per-byte debug tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wire two boards together and run the sample byte exchange.
    Demo(DemoArgs),

    /// Build a world from a manifest (YAML), let it run and report its state.
    Run(RunArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Fifo,
    Memory,
}

impl From<Backend> for ChannelBackend {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Fifo => ChannelBackend::Fifo,
            Backend::Memory => ChannelBackend::Memory,
        }
    }
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Directory holding the A_RX / B_RX pipes
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Channel transport
    #[arg(long, value_enum, default_value = "fifo")]
    channels: Backend,

    /// Byte BoardB sends first (character, decimal or 0x-hex)
    #[arg(long, value_parser = parse_byte, default_value = "Z")]
    request: u8,

    /// Byte BoardA answers with
    #[arg(long, value_parser = parse_byte, default_value = "K")]
    reply: u8,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the world manifest
    #[arg(short, long)]
    world: PathBuf,

    /// Cycles of the first clocked board to run for
    #[arg(long, default_value = "10")]
    cycles: u64,

    /// Write the final world snapshot (JSON) to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the final world snapshot as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays machine-readable.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Demo(args) => run_demo(args),
        Commands::Run(args) => run_world(args),
    }
}

fn run_demo(args: DemoArgs) -> ExitCode {
    info!("Starting TwinBoard demo in {:?}", args.dir);
    let report = match demo::run_demo(&args.dir, args.channels.into(), args.request, args.reply) {
        Ok(report) => report,
        Err(e) => {
            error!("Demo failed: {:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    if let Err(e) = demo::print_report(&report, args.json) {
        error!("{:#}", e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    ExitCode::from(EXIT_OK)
}

fn run_world(args: RunArgs) -> ExitCode {
    let manifest = match WorldManifest::from_file(&args.world) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let root = args.world.parent().unwrap_or_else(|| Path::new("."));

    match simulate(&manifest, root, &args) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn simulate(manifest: &WorldManifest, root: &Path, args: &RunArgs) -> anyhow::Result<()> {
    let mut world = World::from_manifest(manifest, root)?;
    info!(
        "World '{}' up with {} board(s)",
        world.name,
        manifest.boards.len()
    );

    let clocked = manifest.boards.iter().find(|b| b.timer.is_some());
    match clocked {
        Some(cfg) => {
            let clock = world.board(&cfg.name)?.clock();
            info!("Running for {} cycles of {}", args.cycles, cfg.name);
            if !clock.wait_for_cycles(args.cycles) {
                anyhow::bail!("Timer of '{}' stopped early", cfg.name);
            }
        }
        None => std::thread::sleep(UNCLOCKED_SETTLE),
    }

    let snapshot = world.snapshot();
    if let Some(path) = &args.snapshot {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create snapshot file {:?}", path))?;
        serde_json::to_writer_pretty(file, &snapshot).context("Failed to write snapshot")?;
        info!("Snapshot written to {:?}", path);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for board in world.boards() {
            println!(
                "{}: gpio={} cycle={} rx={:?}",
                board.name(),
                board.gpio(),
                board.clock_cycle(),
                board.uart().receiver_state()
            );
        }
    }

    world.remove_streams();
    world.shutdown_all();
    Ok(())
}
