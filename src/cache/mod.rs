//! Generational snapshot cache for the published content tree.
//!
//! - **Stores** keep an ordered revision chain per node, one store per kind.
//! - **Snapshots** pin one generation per kind and read without locks.
//! - **Writers** serialize through a single write section with a timeout.
//! - **Pruning** reclaims revisions below the oldest pinned generation,
//!   inline on release or from a background sweeper.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! write_timeout_ms = 5000
//! prune_mode = "inline"        # or "background"
//! sweep_interval_ms = 1000
//! collect_min_gen_delta = 8
//! channel_capacity = 1024
//! consume_batch_limit = 100
//! ```

mod config;
mod error;
mod events;
mod id_map;
pub(crate) mod lock;
mod manager;
mod registry;
mod revision;
mod scratch;
mod service;
mod snapshot;
mod store;
mod view;

pub use config::{CacheConfig, PruneMode};
pub use error::{IdMapError, ReadError, ServiceError, StoreError, WriteError};
pub use events::{ChangeEvent, ChangeFeed, ChangePublisher, TryPublishError, change_feed};
pub use id_map::{IdResolver, IdentifierMap, KeyResolver};
pub use manager::{KindStats, RebuildOutcome, SnapshotManager, WriteToken};
pub use registry::{GenerationRegistry, Unpinned};
pub use revision::{NodeRevision, RevisionChain};
pub use scratch::ScratchCache;
pub use service::{BatchOutcome, SnapshotService};
pub use snapshot::{Pin, Snapshot};
pub use store::{ApplyOutcome, ContentStore, PruneOutcome, StoreStats};
pub use view::{ContentView, NodeRef, SnapshotHandle};
