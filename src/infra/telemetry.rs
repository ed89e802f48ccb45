use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Registers metric descriptions with the installed recorder, once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "snapcache_generation",
            Unit::Count,
            "Latest published generation per content kind."
        );
        describe_gauge!(
            "snapcache_live_snapshots",
            Unit::Count,
            "Snapshots currently pinning a generation, per content kind."
        );
        describe_histogram!(
            "snapcache_commit_ms",
            Unit::Milliseconds,
            "Time from acquiring the write section to publishing a generation."
        );
        describe_counter!(
            "snapcache_pruned_revisions_total",
            Unit::Count,
            "Total number of node revisions reclaimed by pruning."
        );
        describe_counter!(
            "snapcache_rebuild_total",
            Unit::Count,
            "Total number of full content store rebuilds."
        );
        describe_counter!(
            "snapcache_sequencing_fault_total",
            Unit::Count,
            "Total number of change batches received out of generation order."
        );
        describe_counter!(
            "snapcache_id_map_hit_total",
            Unit::Count,
            "Identifier lookups answered from the map."
        );
        describe_counter!(
            "snapcache_id_map_miss_total",
            Unit::Count,
            "Identifier lookups that fell through to the storage resolver."
        );
    });
}
