//! Aggregated reachability sums per object.

use smallvec::SmallVec;

use crate::db::ObjectId;
use crate::error::{LofError, Result};
use crate::options::LofOptions;
use crate::store::{AccessStats, PagedRecordStore};

/// Conceptual on-page size of one entry: `sum1` plus `min_pts` sums.
const SUM_BYTES: usize = 8;

/// Running sums from which an object's LOF value derives in O(1).
#[derive(Clone, Debug, PartialEq)]
pub struct LofEntry {
    /// Sum of reachability distances across the owner's neighbor list.
    pub sum1: f64,
    /// Per rank, the sum of reachability distances across the list of the
    /// owner's neighbor at that rank.
    pub sum2: SmallVec<[f64; 8]>,
}

impl LofEntry {
    /// Creates an entry from already-computed sums.
    pub fn new(sum1: f64, sum2: SmallVec<[f64; 8]>) -> Self {
        Self { sum1, sum2 }
    }

    /// Total of the per-neighbor sums.
    pub fn sum2_total(&self) -> f64 {
        self.sum2.iter().sum()
    }
}

/// Per-object LOF aggregates over a paged record store.
pub struct LofTable {
    store: PagedRecordStore<LofEntry>,
    min_pts: usize,
}

impl LofTable {
    /// Creates an empty table for `options.min_pts`-length sum vectors.
    pub fn new(options: &LofOptions) -> Result<Self> {
        options.validate()?;
        let store = PagedRecordStore::new(
            options.page_size,
            options.cache_size,
            SUM_BYTES * (1 + options.min_pts),
        )?;
        Ok(Self {
            store,
            min_pts: options.min_pts,
        })
    }

    /// Number of objects with an entry.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether no object has an entry yet.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Stores `id`'s entry during first-time population.
    pub fn insert(&mut self, id: ObjectId, entry: LofEntry) {
        debug_assert_eq!(entry.sum2.len(), self.min_pts);
        self.store.put(id, entry);
    }

    /// Returns a copy of `id`'s entry.
    pub fn entry(&mut self, id: ObjectId) -> Result<LofEntry> {
        Ok(self.store.get(id)?.clone())
    }

    /// Overwrites `id`'s `sum1`.
    pub fn set_sum1(&mut self, id: ObjectId, value: f64) -> Result<()> {
        self.store.update(id, |entry| entry.sum1 = value)
    }

    /// Adds `delta` to `id`'s `sum1`.
    pub fn adjust_sum1(&mut self, id: ObjectId, delta: f64) -> Result<()> {
        self.store.update(id, |entry| entry.sum1 += delta)
    }

    /// Reads `id`'s `sum2` at `rank`.
    pub fn sum2(&mut self, id: ObjectId, rank: usize) -> Result<f64> {
        let value = self
            .store
            .get(id)?
            .sum2
            .get(rank)
            .copied()
            .ok_or(LofError::MissingKey(id))?;
        Ok(value)
    }

    /// Overwrites `id`'s `sum2` at `rank`.
    pub fn set_sum2(&mut self, id: ObjectId, rank: usize, value: f64) -> Result<()> {
        let updated = self.store.update(id, |entry| {
            if let Some(slot) = entry.sum2.get_mut(rank) {
                *slot = value;
                true
            } else {
                false
            }
        })?;
        if updated {
            Ok(())
        } else {
            Err(LofError::MissingKey(id))
        }
    }

    /// Adds `delta` to `id`'s `sum2` at `rank`.
    pub fn adjust_sum2(&mut self, id: ObjectId, rank: usize, delta: f64) -> Result<()> {
        let updated = self.store.update(id, |entry| {
            if let Some(slot) = entry.sum2.get_mut(rank) {
                *slot += delta;
                true
            } else {
                false
            }
        })?;
        if updated {
            Ok(())
        } else {
            Err(LofError::MissingKey(id))
        }
    }

    /// Inserts `value` into `id`'s `sum2` at `rank`, shifting later entries
    /// right and discarding the tail — the aggregate mirror of the neighbor
    /// table's `insert_and_move`.
    pub fn insert_and_move_sum2(&mut self, id: ObjectId, rank: usize, value: f64) -> Result<()> {
        let min_pts = self.min_pts;
        let updated = self.store.update(id, move |entry| {
            if rank > entry.sum2.len() {
                return false;
            }
            entry.sum2.insert(rank, value);
            entry.sum2.truncate(min_pts);
            true
        })?;
        if updated {
            Ok(())
        } else {
            Err(LofError::MissingKey(id))
        }
    }

    /// Access counters of the backing store.
    pub fn stats(&self) -> AccessStats {
        self.store.stats()
    }

    /// Zeroes the access counters.
    pub fn reset_stats(&mut self) {
        self.store.reset_stats();
    }
}
