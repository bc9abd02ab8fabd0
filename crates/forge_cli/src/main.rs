//! Forge CLI: the command-line interface for the Forge build orchestrator.
//!
//! Provides `forge build` for cached, incremental multi-platform builds,
//! `forge cache` for inspecting and trimming the artifact cache, `forge doctor`
//! for checking platform toolchains, and `forge history` for past build reports.

#![warn(missing_docs)]

mod build;
mod cache;
mod doctor;
mod history;
mod project;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use forge_common::{ConfigLevel, OptLevel, Platform};
use tracing_subscriber::EnvFilter;

/// Forge: content-addressed builds for every platform.
#[derive(Parser, Debug)]
#[command(name = "forge", version, about = "Forge multi-platform build orchestrator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `forge.toml` (or the directory holding it).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build targets, reusing cached artifacts where possible.
    Build(BuildArgs),
    /// Inspect or trim the artifact cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check that platform toolchains are installed.
    Doctor {
        /// Platform to check. Checks every platform if omitted.
        platform: Option<Platform>,
    },
    /// Show recent build reports.
    History(HistoryArgs),
}

/// Arguments for the `forge build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Targets to build. Builds every target if omitted.
    pub targets: Vec<String>,

    /// Build the release configuration.
    #[arg(long, conflicts_with = "configuration")]
    pub release: bool,

    /// Configuration level override.
    #[arg(long, value_enum)]
    pub configuration: Option<CliConfigLevel>,

    /// Optimization level override.
    #[arg(short = 'O', long, value_enum)]
    pub optimization: Option<CliOptLevel>,

    /// Maximum number of targets built at once.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Neither read nor populate the artifact cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Treat every file as changed.
    #[arg(long)]
    pub no_incremental: bool,

    /// Extra attempts after a toolchain fails.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-target timeout (e.g. "90s", "10m", "1h").
    #[arg(long)]
    pub timeout: Option<String>,

    /// Report output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Cache operations.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache size and entry counts.
    Stats,
    /// Remove cached artifacts.
    Clear {
        /// Only remove entries built for this platform.
        #[arg(short, long)]
        platform: Option<Platform>,
    },
    /// Apply the configured eviction policy and delete orphaned objects.
    Gc,
}

/// Arguments for the `forge history` subcommand.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Show one report in full.
    pub run: Option<String>,

    /// Number of reports to list.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}

/// Configuration level as accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliConfigLevel {
    /// Debug build.
    Debug,
    /// Release build.
    Release,
}

impl From<CliConfigLevel> for ConfigLevel {
    fn from(level: CliConfigLevel) -> Self {
        match level {
            CliConfigLevel::Debug => ConfigLevel::Debug,
            CliConfigLevel::Release => ConfigLevel::Release,
        }
    }
}

/// Optimization level as accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliOptLevel {
    /// Fastest turnaround.
    Minimal,
    /// The toolchain's default caching.
    Standard,
    /// Every optimization the toolchain offers.
    Aggressive,
}

impl From<CliOptLevel> for OptLevel {
    fn from(level: CliOptLevel) -> Self {
        match level {
            CliOptLevel::Minimal => OptLevel::Minimal,
            CliOptLevel::Standard => OptLevel::Standard,
            CliOptLevel::Aggressive => OptLevel::Aggressive,
        }
    }
}

/// Build report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Cache { ref action } => cache::run(action, &global),
        Command::Doctor { platform } => doctor::run(platform, &global),
        Command::History(ref args) => history::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(verbose: bool, quiet: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Builds the multi-threaded runtime the async commands run on.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_build_default() {
        let cli = Cli::parse_from(["forge", "build"]);
        match cli.command {
            Command::Build(ref args) => {
                assert!(args.targets.is_empty());
                assert!(!args.release);
                assert!(args.configuration.is_none());
                assert!(args.optimization.is_none());
                assert!(args.jobs.is_none());
                assert!(!args.no_cache);
                assert!(!args.no_incremental);
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn parse_build_with_args() {
        let cli = Cli::parse_from([
            "forge",
            "build",
            "site",
            "app",
            "--release",
            "-O",
            "aggressive",
            "--jobs",
            "2",
            "--no-cache",
            "--retries",
            "1",
            "--timeout",
            "5m",
            "--format",
            "json",
        ]);
        match cli.command {
            Command::Build(ref args) => {
                assert_eq!(args.targets, vec!["site", "app"]);
                assert!(args.release);
                assert_eq!(args.optimization, Some(CliOptLevel::Aggressive));
                assert_eq!(args.jobs, Some(2));
                assert!(args.no_cache);
                assert_eq!(args.retries, Some(1));
                assert_eq!(args.timeout.as_deref(), Some("5m"));
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn release_conflicts_with_configuration() {
        let result = Cli::try_parse_from(["forge", "build", "--release", "--configuration", "debug"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_cache_clear_platform() {
        let cli = Cli::parse_from(["forge", "cache", "clear", "--platform", "android"]);
        match cli.command {
            Command::Cache {
                action: CacheAction::Clear { platform },
            } => assert_eq!(platform, Some(Platform::Android)),
            _ => panic!("expected Cache Clear command"),
        }
    }

    #[test]
    fn parse_cache_stats_and_gc() {
        assert!(matches!(
            Cli::parse_from(["forge", "cache", "stats"]).command,
            Command::Cache {
                action: CacheAction::Stats
            }
        ));
        assert!(matches!(
            Cli::parse_from(["forge", "cache", "gc"]).command,
            Command::Cache {
                action: CacheAction::Gc
            }
        ));
    }

    #[test]
    fn parse_doctor() {
        let cli = Cli::parse_from(["forge", "doctor", "ios"]);
        assert!(matches!(cli.command, Command::Doctor { platform: Some(Platform::Ios) }));
        let cli = Cli::parse_from(["forge", "doctor"]);
        assert!(matches!(cli.command, Command::Doctor { platform: None }));
    }

    #[test]
    fn parse_history() {
        let cli = Cli::parse_from(["forge", "history", "-n", "3"]);
        match cli.command {
            Command::History(ref args) => {
                assert_eq!(args.limit, 3);
                assert!(args.run.is_none());
            }
            _ => panic!("expected History command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["forge", "--quiet", "--config", "/p/forge.toml", "build"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/p/forge.toml"));
    }

    #[test]
    fn level_conversions() {
        assert_eq!(ConfigLevel::from(CliConfigLevel::Release), ConfigLevel::Release);
        assert_eq!(OptLevel::from(CliOptLevel::Minimal), OptLevel::Minimal);
    }
}
