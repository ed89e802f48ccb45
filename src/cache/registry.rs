//! Per-kind bookkeeping of which generations live snapshots still observe.

use std::collections::BTreeMap;

use crate::domain::types::{Epoch, Generation};

/// Result of dropping one snapshot pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unpinned {
    /// The pin belongs to an epoch that a rebuild already discarded.
    Stale,
    /// Other snapshots still observe the generation.
    StillPinned,
    /// The last observer of the generation is gone.
    Freed,
}

/// Live snapshot counts keyed by generation, plus the published generation.
///
/// Guarded by one mutex per kind; every operation is O(log n) in the number
/// of distinct pinned generations.
#[derive(Debug)]
pub struct GenerationRegistry {
    epoch: Epoch,
    current: Generation,
    live: BTreeMap<Generation, u32>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            current: 0,
            live: BTreeMap::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    /// Registers a reader of the current generation.
    pub fn pin(&mut self) -> (Epoch, Generation) {
        let counter = self.live.entry(self.current).or_insert(0);
        *counter = counter.saturating_add(1);
        (self.epoch, self.current)
    }

    pub fn unpin(&mut self, epoch: Epoch, generation: Generation) -> Unpinned {
        if epoch != self.epoch {
            return Unpinned::Stale;
        }
        match self.live.get_mut(&generation) {
            Some(counter) if *counter > 1 => {
                *counter -= 1;
                Unpinned::StillPinned
            }
            Some(_) => {
                self.live.remove(&generation);
                Unpinned::Freed
            }
            None => Unpinned::Stale,
        }
    }

    /// Makes `generation` the one new snapshots observe.
    pub fn publish(&mut self, generation: Generation) {
        debug_assert!(generation >= self.current);
        self.current = generation;
    }

    /// Oldest generation any live snapshot or future snapshot can observe.
    pub fn floor(&self) -> Generation {
        self.live
            .keys()
            .next()
            .copied()
            .unwrap_or(self.current)
    }

    /// Starts a new epoch after a rebuild; pins from older epochs become stale.
    pub fn reset(&mut self, epoch: Epoch, generation: Generation) {
        self.epoch = epoch;
        self.current = generation;
        self.live.clear();
    }

    pub fn live_snapshots(&self) -> u64 {
        self.live.values().map(|count| u64::from(*count)).sum()
    }

    pub fn pinned_generations(&self) -> usize {
        self.live.len()
    }
}

impl Default for GenerationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
