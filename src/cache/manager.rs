//! Snapshot lifecycle, the write section, and revision reclamation.
//!
//! One writer at a time holds the write section (a tokio mutex acquired with
//! a timeout). A commit applies a change set to the kind's store and then
//! publishes the new generation; snapshots created afterwards pin it.
//! Rebuilding a kind swaps in a fresh store under a new epoch, which
//! invalidates every snapshot pinned to the old one.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::{Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::{
    changes::ChangeBatch,
    entities::NodeRecord,
    types::{ContentKind, Epoch, Generation},
};

use super::config::CacheConfig;
use super::error::{ReadError, WriteError};
use super::lock::{mutex_lock, rw_read, rw_write};
use super::registry::{GenerationRegistry, Unpinned};
use super::snapshot::{Pin, Snapshot};
use super::store::{ApplyOutcome, ContentStore, PruneOutcome, StoreStats};

const SOURCE: &str = "cache::manager";

const METRIC_GENERATION: &str = "snapcache_generation";
const METRIC_LIVE_SNAPSHOTS: &str = "snapcache_live_snapshots";
const METRIC_COMMIT_MS: &str = "snapcache_commit_ms";
const METRIC_PRUNED_REVISIONS: &str = "snapcache_pruned_revisions_total";
const METRIC_REBUILD: &str = "snapcache_rebuild_total";

/// Proof of holding the write section. Dropping it without committing
/// releases the section and consumes no generation.
pub struct WriteToken {
    _guard: OwnedMutexGuard<()>,
    acquired_at: Instant,
}

impl WriteToken {
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for WriteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteToken")
            .field("held_for", &self.held_for())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub kind: ContentKind,
    pub epoch: Epoch,
    pub generation: Generation,
    pub nodes: usize,
}

/// Store counters combined with the kind's snapshot bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub live_snapshots: u64,
    pub pinned_generations: usize,
    pub floor: Generation,
}

struct KindSlot {
    store: RwLock<Arc<ContentStore>>,
    registry: Mutex<GenerationRegistry>,
}

impl KindSlot {
    fn new(kind: ContentKind) -> Self {
        Self {
            store: RwLock::new(Arc::new(ContentStore::new(kind, 0))),
            registry: Mutex::new(GenerationRegistry::new()),
        }
    }

    fn store(&self) -> Arc<ContentStore> {
        Arc::clone(&rw_read(&self.store, SOURCE, "store"))
    }

    fn registry(&self) -> MutexGuard<'_, GenerationRegistry> {
        mutex_lock(&self.registry, SOURCE, "registry")
    }
}

pub struct SnapshotManager {
    config: CacheConfig,
    write_section: Arc<tokio::sync::Mutex<()>>,
    slots: [KindSlot; 3],
    sweep_requested: Arc<Notify>,
}

impl SnapshotManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            write_section: Arc::new(tokio::sync::Mutex::new(())),
            slots: ContentKind::ALL.map(KindSlot::new),
            sweep_requested: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn slot(&self, kind: ContentKind) -> &KindSlot {
        &self.slots[kind.index()]
    }

    pub fn current_generation(&self, kind: ContentKind) -> Generation {
        self.slot(kind).registry().current()
    }

    pub fn current_epoch(&self, kind: ContentKind) -> Epoch {
        self.slot(kind).registry().epoch()
    }

    // ========================================================================
    // Write section
    // ========================================================================

    /// Waits up to the configured timeout for exclusive write access.
    pub async fn begin_write(&self) -> Result<WriteToken, WriteError> {
        let waited = self.config.write_timeout;
        match tokio::time::timeout(waited, Arc::clone(&self.write_section).lock_owned()).await {
            Ok(guard) => Ok(WriteToken {
                _guard: guard,
                acquired_at: Instant::now(),
            }),
            Err(_) => {
                warn!(
                    waited_ms = waited.as_millis() as u64,
                    "Timed out waiting for the write section"
                );
                Err(WriteError::Timeout { waited })
            }
        }
    }

    /// Applies `batch` as the kind's next generation and publishes it.
    ///
    /// An empty batch is a no-op. On error nothing is published and the
    /// write section is released.
    pub fn commit_write(
        &self,
        token: WriteToken,
        batch: &ChangeBatch,
    ) -> Result<ApplyOutcome, WriteError> {
        let kind = batch.kind;
        let slot = self.slot(kind);
        let store = slot.store();

        if batch.is_empty() {
            return Ok(ApplyOutcome {
                generation: store.generation(),
                ..ApplyOutcome::default()
            });
        }

        let generation = batch
            .expected_generation
            .unwrap_or_else(|| store.generation() + 1);
        let outcome = store.apply_change_set(generation, &batch.changes)?;
        slot.registry().publish(generation);

        gauge!(METRIC_GENERATION, "kind" => kind.as_str()).set(generation as f64);
        histogram!(METRIC_COMMIT_MS, "kind" => kind.as_str())
            .record(token.held_for().as_secs_f64() * 1000.0);
        info!(
            kind = %kind,
            generation,
            changes = batch.changes.len(),
            upserted = outcome.upserted,
            removed = outcome.removed,
            "Committed change set"
        );
        drop(token);

        self.after_commit(kind);
        Ok(outcome)
    }

    fn after_commit(&self, kind: ContentKind) {
        if self.config.prunes_inline() {
            self.prune_kind(kind);
            return;
        }
        let lag = {
            let registry = self.slot(kind).registry();
            registry.current().saturating_sub(registry.floor())
        };
        if lag > self.config.collect_min_gen_delta {
            self.sweep_requested.notify_one();
        }
    }

    /// Replaces the kind's store with one holding exactly `records`.
    ///
    /// The new store starts a fresh epoch at generation 1; snapshots pinned
    /// to the previous epoch fail their next read of this kind.
    pub fn rebuild(
        &self,
        token: WriteToken,
        kind: ContentKind,
        records: Vec<NodeRecord>,
    ) -> Result<RebuildOutcome, WriteError> {
        self.rebuild_at(token, kind, records, 1)
    }

    /// [`rebuild`](Self::rebuild) with the fresh store published as
    /// `generation`, so a feed that numbers its batches continues from there.
    pub fn rebuild_at(
        &self,
        token: WriteToken,
        kind: ContentKind,
        records: Vec<NodeRecord>,
        generation: Generation,
    ) -> Result<RebuildOutcome, WriteError> {
        let slot = self.slot(kind);
        let epoch = slot.store().epoch() + 1;
        let generation = generation.max(1);
        let nodes = records.len();
        let fresh = Arc::new(ContentStore::from_records_at(
            kind, epoch, generation, records,
        )?);

        {
            let mut registry = slot.registry();
            *rw_write(&slot.store, SOURCE, "rebuild") = fresh;
            registry.reset(epoch, generation);
        }
        drop(token);

        gauge!(METRIC_GENERATION, "kind" => kind.as_str()).set(generation as f64);
        gauge!(METRIC_LIVE_SNAPSHOTS, "kind" => kind.as_str()).set(0.0);
        counter!(METRIC_REBUILD, "kind" => kind.as_str()).increment(1);
        info!(kind = %kind, epoch, generation, nodes, "Rebuilt content store");

        Ok(RebuildOutcome {
            kind,
            epoch,
            generation,
            nodes,
        })
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Pins the current generation of every kind.
    pub fn create_snapshot(self: &Arc<Self>) -> Snapshot {
        let pins = ContentKind::ALL.map(|kind| self.pin(kind));
        Snapshot::new(Arc::clone(self), pins)
    }

    fn pin(&self, kind: ContentKind) -> Pin {
        let (epoch, generation, live) = {
            let mut registry = self.slot(kind).registry();
            let (epoch, generation) = registry.pin();
            (epoch, generation, registry.live_snapshots())
        };
        gauge!(METRIC_LIVE_SNAPSHOTS, "kind" => kind.as_str()).set(live as f64);
        Pin {
            kind,
            epoch,
            generation,
        }
    }

    pub(crate) fn unpin(&self, pin: Pin) {
        let (unpinned, live) = {
            let mut registry = self.slot(pin.kind).registry();
            let unpinned = registry.unpin(pin.epoch, pin.generation);
            (unpinned, registry.live_snapshots())
        };
        gauge!(METRIC_LIVE_SNAPSHOTS, "kind" => pin.kind.as_str()).set(live as f64);

        // Never waits on a running prune; skipped garbage stays queued for
        // the next release or commit.
        if unpinned == Unpinned::Freed && self.config.prunes_inline() {
            self.try_prune_kind(pin.kind);
        }
    }

    /// The kind's store, provided the pin still belongs to its epoch.
    pub fn store_for(&self, pin: &Pin) -> Result<Arc<ContentStore>, ReadError> {
        let store = self.slot(pin.kind).store();
        if store.epoch() != pin.epoch {
            return Err(ReadError::SnapshotInvalidated {
                kind: pin.kind,
                pinned: pin.epoch,
                current: store.epoch(),
            });
        }
        Ok(store)
    }

    // ========================================================================
    // Pruning
    // ========================================================================

    fn floor_and_store(&self, kind: ContentKind) -> (Generation, Arc<ContentStore>) {
        let slot = self.slot(kind);
        let registry = slot.registry();
        (registry.floor(), slot.store())
    }

    pub fn prune_kind(&self, kind: ContentKind) -> PruneOutcome {
        let (floor, store) = self.floor_and_store(kind);
        let outcome = store.prune(floor);
        record_prune(kind, &outcome);
        outcome
    }

    /// Prunes `kind` unless another prune of it is already running.
    pub fn try_prune_kind(&self, kind: ContentKind) -> Option<PruneOutcome> {
        let (floor, store) = self.floor_and_store(kind);
        let outcome = store.try_prune(floor)?;
        record_prune(kind, &outcome);
        Some(outcome)
    }

    /// One background pass over every kind; kinds already being pruned are skipped.
    pub fn sweep(&self) -> usize {
        ContentKind::ALL
            .into_iter()
            .filter_map(|kind| self.try_prune_kind(kind))
            .map(|outcome| outcome.revisions)
            .sum()
    }

    /// Starts the periodic sweeper in background mode; `None` when pruning runs inline.
    ///
    /// The task holds only a weak reference and exits once the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.config.prunes_inline() {
            return None;
        }
        let manager = Arc::downgrade(self);
        let wake = Arc::clone(&self.sweep_requested);
        let interval = self.config.sweep_interval;
        Some(tokio::spawn(sweep_loop(manager, wake, interval)))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn stats(&self, kind: ContentKind) -> KindStats {
        let slot = self.slot(kind);
        let (live_snapshots, pinned_generations, floor, store) = {
            let registry = slot.registry();
            (
                registry.live_snapshots(),
                registry.pinned_generations(),
                registry.floor(),
                slot.store(),
            )
        };
        KindStats {
            store: store.stats(),
            live_snapshots,
            pinned_generations,
            floor,
        }
    }

    pub fn all_stats(&self) -> Vec<KindStats> {
        ContentKind::ALL
            .into_iter()
            .map(|kind| self.stats(kind))
            .collect()
    }
}

fn record_prune(kind: ContentKind, outcome: &PruneOutcome) {
    if outcome.revisions == 0 {
        return;
    }
    counter!(METRIC_PRUNED_REVISIONS, "kind" => kind.as_str())
        .increment(outcome.revisions as u64);
    debug!(
        kind = %kind,
        floor = outcome.floor,
        revisions = outcome.revisions,
        nodes = outcome.nodes,
        "Reclaimed unobservable revisions"
    );
}

async fn sweep_loop(manager: Weak<SnapshotManager>, wake: Arc<Notify>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        let Some(manager) = manager.upgrade() else {
            debug!("Snapshot manager dropped; sweeper exiting");
            break;
        };
        manager.sweep();
    }
}
