//! Process-wide entry point: cold load, change-feed consumption, snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::source::ContentSource;
use crate::domain::{
    changes::ChangeBatch,
    types::{ContentKind, Epoch, Generation, NodeId, NodeKey},
};

use super::config::CacheConfig;
use super::error::{ServiceError, WriteError};
use super::events::{ChangeEvent, ChangeFeed, ChangePublisher, change_feed};
use super::id_map::IdentifierMap;
use super::lock::mutex_lock;
use super::manager::{KindStats, RebuildOutcome, SnapshotManager};
use super::scratch::ScratchCache;
use super::snapshot::Snapshot;
use super::store::ApplyOutcome;
use super::view::SnapshotHandle;

const SOURCE: &str = "cache::service";

const METRIC_SEQUENCING_FAULT: &str = "snapcache_sequencing_fault_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied(ApplyOutcome),
    Rebuilt(RebuildOutcome),
}

/// Shared memo cache valid for one vector of per-kind pins.
struct ElementsCache {
    pins: [(Epoch, Generation); 3],
    cache: ScratchCache,
}

pub struct SnapshotService {
    manager: Arc<SnapshotManager>,
    id_map: Arc<IdentifierMap>,
    source: Arc<dyn ContentSource>,
    ready: [AtomicBool; 3],
    elements: Mutex<ElementsCache>,
    feed: Mutex<Option<ChangeFeed>>,
}

impl SnapshotService {
    /// Builds the service around `feed` and registers the source's
    /// identifier lookups with the identifier map.
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn ContentSource>,
        feed: ChangeFeed,
    ) -> Result<Self, ServiceError> {
        let id_map = Arc::new(IdentifierMap::new());
        for kind in ContentKind::ALL {
            let by_id = Arc::clone(&source);
            let by_key = Arc::clone(&source);
            id_map.register_resolvers(
                kind,
                Arc::new(move |id: NodeId| by_id.resolve_identifier(kind, id)),
                Arc::new(move |key: NodeKey| by_key.resolve_key(kind, key)),
            )?;
        }

        Ok(Self {
            manager: Arc::new(SnapshotManager::new(config)),
            id_map,
            source,
            ready: ContentKind::ALL.map(|_| AtomicBool::new(false)),
            elements: Mutex::new(ElementsCache {
                pins: [(0, 0); 3],
                cache: ScratchCache::new(),
            }),
            feed: Mutex::new(Some(feed)),
        })
    }

    /// Creates the feed channel sized from `config` together with the service.
    pub fn with_feed(
        config: CacheConfig,
        source: Arc<dyn ContentSource>,
    ) -> Result<(Arc<Self>, ChangePublisher), ServiceError> {
        let (publisher, feed) = change_feed(config.channel_capacity_non_zero());
        let service = Self::new(config, source, feed)?;
        Ok((Arc::new(service), publisher))
    }

    pub fn manager(&self) -> &Arc<SnapshotManager> {
        &self.manager
    }

    pub fn id_map(&self) -> &Arc<IdentifierMap> {
        &self.id_map
    }

    pub fn is_ready(&self, kind: ContentKind) -> bool {
        self.ready[kind.index()].load(Ordering::Acquire)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Cold-loads every kind. Kinds that load stay ready even when another
    /// fails; the first failure is returned.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut first_error = None;
        for kind in ContentKind::ALL {
            if let Err(err) = self.load_kind(kind).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                info!("Snapshot cache ready");
                Ok(())
            }
        }
    }

    /// Reloads `kind` from storage and swaps it in under a new epoch.
    ///
    /// Storage is read outside the write section. On failure the current
    /// store, if any, keeps serving.
    pub async fn load_kind(&self, kind: ContentKind) -> Result<RebuildOutcome, ServiceError> {
        self.load_kind_at(kind, 1).await
    }

    /// [`load_kind`](Self::load_kind) with the reloaded content published
    /// as `generation`.
    pub async fn load_kind_at(
        &self,
        kind: ContentKind,
        generation: Generation,
    ) -> Result<RebuildOutcome, ServiceError> {
        let started_at = Instant::now();
        let records = match self.source.load_all_nodes(kind).await {
            Ok(records) => records,
            Err(err) => {
                if self.is_ready(kind) {
                    warn!(kind = %kind, error = %err, "Reload failed; keeping current content");
                } else {
                    error!(kind = %kind, error = %err, "Cold load failed; snapshots unavailable");
                }
                return Err(ServiceError::load(kind, err));
            }
        };

        let token = self.manager.begin_write().await?;
        let outcome = self
            .manager
            .rebuild_at(token, kind, records, generation)
            .inspect_err(|err| {
                error!(kind = %kind, error = %err, "Loaded content rejected; keeping current content");
            })?;
        self.ready[kind.index()].store(true, Ordering::Release);

        info!(
            kind = %kind,
            epoch = outcome.epoch,
            generation = outcome.generation,
            nodes = outcome.nodes,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Loaded content from storage"
        );
        Ok(outcome)
    }

    /// Rebuilds every kind from storage.
    pub async fn force_rebuild(&self) -> Result<(), ServiceError> {
        for kind in ContentKind::ALL {
            self.load_kind(kind).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn create_snapshot(&self) -> Result<SnapshotHandle, ServiceError> {
        if let Some(kind) = ContentKind::ALL
            .into_iter()
            .find(|kind| !self.is_ready(*kind))
        {
            return Err(ServiceError::NotReady { kind });
        }

        let snapshot = self.manager.create_snapshot();
        let elements = self.elements_for(&snapshot);
        Ok(SnapshotHandle::new(
            snapshot,
            Arc::clone(&self.id_map),
            elements,
        ))
    }

    fn elements_for(&self, snapshot: &Snapshot) -> ScratchCache {
        let pins = ContentKind::ALL.map(|kind| {
            let pin = snapshot.pin(kind);
            (pin.epoch, pin.generation)
        });
        let mut elements = mutex_lock(&self.elements, SOURCE, "elements_for");
        if elements.pins != pins {
            *elements = ElementsCache {
                pins,
                cache: ScratchCache::new(),
            };
        }
        elements.cache.clone()
    }

    // ========================================================================
    // Change feed
    // ========================================================================

    /// Applies one batch. A full refresh, an out-of-sequence batch, or a
    /// batch the store rejects is answered by reloading the kind.
    ///
    /// A numbered batch that triggers a reload republishes storage as its
    /// own generation, so the batches after it apply in sequence.
    pub async fn apply(&self, batch: ChangeBatch) -> Result<BatchOutcome, ServiceError> {
        let kind = batch.kind;
        let reload_at = reload_generation(&batch);
        if batch.requires_rebuild() {
            return self
                .load_kind_at(kind, reload_at)
                .await
                .map(BatchOutcome::Rebuilt);
        }

        let token = self.manager.begin_write().await?;
        match self.manager.commit_write(token, &batch) {
            Ok(outcome) => Ok(BatchOutcome::Applied(outcome)),
            Err(WriteError::Store(err)) => {
                if err.is_sequencing_fault() {
                    counter!(METRIC_SEQUENCING_FAULT, "kind" => kind.as_str()).increment(1);
                    error!(kind = %kind, error = %err, "Change feed out of sequence; rebuilding");
                } else {
                    error!(kind = %kind, error = %err, "Change batch rejected; rebuilding");
                }
                self.load_kind_at(kind, reload_at)
                    .await
                    .map(BatchOutcome::Rebuilt)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn process(&self, event: ChangeEvent) {
        let kind = event.batch.kind;
        let reload_at = reload_generation(&event.batch);
        if let Err(err) = self.apply(event.batch).await {
            error!(
                event_id = %event.id,
                sequence = event.sequence,
                kind = %kind,
                error = %err,
                "Failed to apply change batch; reloading kind"
            );
            if let Err(err) = self.load_kind_at(kind, reload_at).await {
                error!(kind = %kind, error = %err, "Reload after failed batch also failed");
            }
        }
    }

    /// Applies the batches already queued on the feed, up to the configured
    /// per-wakeup limit. Returns how many were applied.
    pub async fn consume_pending(&self) -> Result<usize, ServiceError> {
        let Some(mut feed) = mutex_lock(&self.feed, SOURCE, "consume_pending").take() else {
            return Ok(0);
        };
        let drained = feed.drain_ready(self.manager.config().consume_batch_limit_non_zero());
        *mutex_lock(&self.feed, SOURCE, "consume_pending") = Some(feed);

        let events = drained?;
        let count = events.len();
        for event in events {
            self.process(event).await;
        }
        Ok(count)
    }

    /// Hands the feed to a background task that applies batches until every
    /// publisher is dropped. `None` if the feed was already taken.
    pub fn spawn_consumer(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let feed = mutex_lock(&self.feed, SOURCE, "spawn_consumer").take()?;
        let service = Arc::clone(self);
        Some(tokio::spawn(async move { service.run(feed).await }))
    }

    async fn run(&self, mut feed: ChangeFeed) {
        let limit = self.manager.config().consume_batch_limit_non_zero();
        loop {
            let events = feed.recv_batch(limit).await;
            if events.is_empty() {
                info!("Change feed closed; consumer exiting");
                break;
            }
            let count = events.len();
            for event in events {
                self.process(event).await;
            }
            info!(batches = count, "Change batches applied");
            tokio::task::yield_now().await;
        }
    }

    /// Starts the background sweeper when configured for it.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        self.manager.spawn_sweeper()
    }

    pub fn stats(&self) -> Vec<KindStats> {
        self.manager.all_stats()
    }
}

fn reload_generation(batch: &ChangeBatch) -> Generation {
    batch.expected_generation.unwrap_or(1)
}
