use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::{cache::PruneMode, domain::types::ContentKind};

/// Command-line arguments for the snapcache binary.
#[derive(Debug, Parser)]
#[command(name = "snapcache", version, about = "Generational snapshot cache for published content")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SNAPCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Load a content fixture and print the published tree with cache statistics.
    Inspect(InspectArgs),
    /// Load a content fixture, replay a recorded change feed, and print the result.
    Replay(ReplayArgs),
}

impl Command {
    pub fn overrides(&self) -> &RuntimeOverrides {
        match self {
            Command::Inspect(args) => &args.overrides,
            Command::Replay(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// JSON content fixture to load.
    #[arg(value_name = "FIXTURE", value_hint = ValueHint::FilePath)]
    pub fixture: PathBuf,

    /// Only print the tree of this kind (document|media|member).
    #[arg(long = "kind", value_name = "KIND")]
    pub kind: Option<ContentKind>,
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// JSON content fixture to load.
    #[arg(value_name = "FIXTURE", value_hint = ValueHint::FilePath)]
    pub fixture: PathBuf,

    /// JSON array of change batches to publish after the cold load.
    #[arg(long = "changes", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub changes: PathBuf,

    /// Only print the tree of this kind (document|media|member).
    #[arg(long = "kind", value_name = "KIND")]
    pub kind: Option<ContentKind>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override how long a writer waits for the write section.
    #[arg(long = "cache-write-timeout-ms", value_name = "MILLIS")]
    pub write_timeout_ms: Option<u64>,

    /// Override where pruning runs (inline|background).
    #[arg(long = "cache-prune-mode", value_name = "MODE")]
    pub prune_mode: Option<PruneMode>,

    /// Override the background sweeper cadence.
    #[arg(long = "cache-sweep-interval-ms", value_name = "MILLIS")]
    pub sweep_interval_ms: Option<u64>,
}
