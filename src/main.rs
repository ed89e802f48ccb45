use std::{path::Path, process, sync::Arc};

use snapcache::{
    application::{error::AppError, report, source::ContentSource},
    cache::{CacheConfig, ChangePublisher, ServiceError, SnapshotService, TryPublishError},
    config,
    domain::{changes::ChangeBatch, types::ContentKind},
    infra::{fixture, memory::MemorySource, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let cache_config = CacheConfig::from(&settings.cache);

    match cli_args.command {
        config::Command::Inspect(args) => {
            let (service, _source, _publisher) = boot(&args.fixture, cache_config).await?;
            print_report(&service, args.kind)
        }
        config::Command::Replay(args) => {
            let batches = fixture::load_changes(&args.changes).await?;
            let (service, source, publisher) = boot(&args.fixture, cache_config).await?;
            let sweeper = service.spawn_sweeper();

            replay(&service, &source, &publisher, batches).await?;

            if let Some(handle) = sweeper {
                handle.abort();
            }
            print_report(&service, args.kind)
        }
    }
}

async fn boot(
    fixture_path: &Path,
    cache_config: CacheConfig,
) -> Result<(Arc<SnapshotService>, Arc<MemorySource>, ChangePublisher), AppError> {
    let content = fixture::load_content(fixture_path).await?;
    let source = Arc::new(content.into_source());
    let (service, publisher) = SnapshotService::with_feed(
        cache_config,
        Arc::clone(&source) as Arc<dyn ContentSource>,
    )?;
    service.start().await?;
    Ok((service, source, publisher))
}

/// Writes each batch to storage, then publishes it, draining the feed
/// whenever the channel fills up.
async fn replay(
    service: &SnapshotService,
    source: &MemorySource,
    publisher: &ChangePublisher,
    batches: Vec<ChangeBatch>,
) -> Result<(), AppError> {
    let total = batches.len();
    for batch in batches {
        source.apply(batch.kind, &batch.changes);
        match publisher.try_publish(batch) {
            Ok(()) => {}
            Err(TryPublishError::Full(batch)) => {
                service.consume_pending().await?;
                publisher.publish(batch).await?;
            }
            Err(TryPublishError::Closed(_)) => return Err(ServiceError::FeedClosed.into()),
        }
    }

    while service.consume_pending().await? > 0 {}

    info!(batches = total, "Replayed change feed");
    Ok(())
}

fn print_report(service: &SnapshotService, kind: Option<ContentKind>) -> Result<(), AppError> {
    let handle = service.create_snapshot()?;
    let report = report::cache_report(service, &handle, kind)?;
    handle.release();

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::unexpected(format!("failed to render report: {err}")))?;
    println!("{rendered}");
    Ok(())
}
