//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::PruneMode;

mod cli;
#[cfg(test)]
mod tests;

pub use cli::{CliArgs, Command, InspectArgs, ReplayArgs, RuntimeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "snapcache";
const ENV_PREFIX: &str = "SNAPCACHE";
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;
const DEFAULT_COLLECT_MIN_GEN_DELTA: u64 = 8;
const DEFAULT_CHANNEL_CAPACITY: u64 = 1024;
const DEFAULT_CONSUME_BATCH_LIMIT: u64 = 100;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub write_timeout: Duration,
    pub prune_mode: PruneMode,
    pub sweep_interval: Duration,
    pub collect_min_gen_delta: u64,
    pub channel_capacity: NonZeroUsize,
    pub consume_batch_limit: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    write_timeout_ms: Option<u64>,
    prune_mode: Option<String>,
    sweep_interval_ms: Option<u64>,
    collect_min_gen_delta: Option<u64>,
    channel_capacity: Option<u64>,
    consume_batch_limit: Option<u64>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(timeout) = overrides.write_timeout_ms {
            self.cache.write_timeout_ms = Some(timeout);
        }
        if let Some(mode) = overrides.prune_mode {
            let mode = match mode {
                PruneMode::Inline => "inline",
                PruneMode::Background => "background",
            };
            self.cache.prune_mode = Some(mode.to_string());
        }
        if let Some(interval) = overrides.sweep_interval_ms {
            self.cache.sweep_interval_ms = Some(interval);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            cache: build_cache_settings(raw.cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let write_timeout_ms = cache.write_timeout_ms.unwrap_or(DEFAULT_WRITE_TIMEOUT_MS);
    if write_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.write_timeout_ms",
            "must be greater than zero",
        ));
    }

    let prune_mode = match cache.prune_mode {
        Some(mode) => PruneMode::from_str(&mode)
            .map_err(|reason| LoadError::invalid("cache.prune_mode", reason))?,
        None => PruneMode::default(),
    };

    let sweep_interval_ms = cache.sweep_interval_ms.unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);
    if sweep_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cache.sweep_interval_ms",
            "must be greater than zero",
        ));
    }

    let channel_capacity = non_zero_usize(
        cache.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        "cache.channel_capacity",
    )?;
    let consume_batch_limit = non_zero_usize(
        cache
            .consume_batch_limit
            .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT),
        "cache.consume_batch_limit",
    )?;

    Ok(CacheSettings {
        write_timeout: Duration::from_millis(write_timeout_ms),
        prune_mode,
        sweep_interval: Duration::from_millis(sweep_interval_ms),
        collect_min_gen_delta: cache
            .collect_min_gen_delta
            .unwrap_or(DEFAULT_COLLECT_MIN_GEN_DELTA),
        channel_capacity,
        consume_batch_limit,
    })
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
