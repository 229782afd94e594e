//! Weft CLI, the command-line front end of the Weft hardware generator.
//!
//! Provides `weft build` to generate, compile and package the system described
//! by `weft.toml`, `weft sim` to run it in the cycle simulator, and
//! `weft designs` / `weft backends` to list what can be built and where.

#![warn(missing_docs)]

mod backends;
mod build;
mod designs;
mod pipeline;
mod sim;

use std::io::IsTerminal;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Weft: latency-insensitive hardware generation.
#[derive(Parser, Debug)]
#[command(name = "weft", version, about = "Weft hardware generator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `weft.toml` (or the directory holding it).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate, compile and package the system for a target.
    Build(BuildArgs),
    /// Run the system in the cycle simulator.
    Sim(SimArgs),
    /// List the designs `system.design` may name.
    Designs,
    /// List the backend presets and what they support.
    Backends,
}

/// Arguments for the `weft build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target name to select from `weft.toml`.
    #[arg(short, long)]
    pub target: Option<String>,

    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `weft sim` subcommand.
#[derive(Parser, Debug)]
pub struct SimArgs {
    /// Target name to select from `weft.toml`.
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of cycles to run (default: `sim.max_cycles`).
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Preload a memory word before the run, as `PATH:ADDRESS=VALUE`.
    #[arg(long, value_name = "PATH:ADDRESS=VALUE")]
    pub poke: Vec<String>,

    /// Drive a top-level input for the whole run, as `NAME=VALUE`.
    #[arg(long, value_name = "NAME=VALUE")]
    pub input: Vec<String>,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Diagnostic output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// One JSON object per line.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    init_tracing(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Sim(ref args) => sim::run(args, &global),
        Command::Designs => designs::run(),
        Command::Backends => backends::run(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(verbose: bool, quiet: bool) {
    let filter = default_filter(verbose, quiet);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}
