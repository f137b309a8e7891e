//! Fixed-budget paged record store.
//!
//! Records live in an unbounded logical map keyed by object id; the store
//! additionally models page residency under an LRU cache budget and counts
//! physical accesses (page faults and dirty write-backs) next to logical
//! ones. Eviction affects residency and accounting only — no record is ever
//! dropped from the logical store.

use lru::LruCache;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{LofError, Result};

/// Identifier of a record within a store.
pub type RecordId = u64;

/// Identifier of a page of records.
pub type PageId = u64;

/// Physical and logical access counters for one record store.
///
/// Physical reads count cache misses on pages that had been materialized
/// before; physical writes count dirty pages written back on eviction or
/// flush. Logical counters tick on every record access, hit or miss. All
/// counters are diagnostics scoped to the current run and can be reset
/// without touching store contents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AccessStats {
    /// Pages loaded because a requested record was not resident.
    pub physical_reads: u64,
    /// Dirty pages written back on eviction or flush.
    pub physical_writes: u64,
    /// Record reads, regardless of residency.
    pub logical_reads: u64,
    /// Record writes, regardless of residency.
    pub logical_writes: u64,
}

struct Frame {
    dirty: bool,
}

/// Cache-accounted record store mapping a [`RecordId`] to one record.
///
/// The key space is partitioned into pages of `page_size / record_bytes`
/// records (at least one); the cache holds `cache_size / page_size` pages
/// (at least one) and evicts least-recently-used pages beyond that budget.
pub struct PagedRecordStore<V> {
    records: FxHashMap<RecordId, V>,
    cache: LruCache<PageId, Frame>,
    /// Pages that exist outside the cache and must be loaded on a miss.
    materialized: FxHashSet<PageId>,
    records_per_page: u64,
    cache_pages: usize,
    stats: AccessStats,
}

impl<V> PagedRecordStore<V> {
    /// Creates a store for records of the given conceptual on-page size.
    pub fn new(page_size: usize, cache_size: usize, record_bytes: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(LofError::InvalidConfiguration(
                "page_size must be greater than zero".into(),
            ));
        }
        if record_bytes == 0 {
            return Err(LofError::InvalidConfiguration(
                "record size must be greater than zero".into(),
            ));
        }
        if cache_size < page_size {
            return Err(LofError::InvalidConfiguration(
                "cache_size must hold at least one page".into(),
            ));
        }
        let records_per_page = ((page_size / record_bytes).max(1)) as u64;
        let cache_pages = (cache_size / page_size).max(1);
        Ok(Self {
            records: FxHashMap::default(),
            cache: LruCache::unbounded(),
            materialized: FxHashSet::default(),
            records_per_page,
            cache_pages,
            stats: AccessStats::default(),
        })
    }

    fn page_of(&self, key: RecordId) -> PageId {
        key / self.records_per_page
    }

    /// Makes `page` resident, counting a physical read when it has to be
    /// loaded and a physical write when a dirty page falls out of the
    /// budget.
    fn touch(&mut self, page: PageId) {
        if self.cache.get(&page).is_some() {
            return;
        }
        if self.materialized.remove(&page) {
            self.stats.physical_reads += 1;
        }
        self.cache.put(page, Frame { dirty: false });
        while self.cache.len() > self.cache_pages {
            if let Some((evicted, frame)) = self.cache.pop_lru() {
                self.materialized.insert(evicted);
                if frame.dirty {
                    self.stats.physical_writes += 1;
                }
            }
        }
    }

    fn mark_dirty(&mut self, page: PageId) {
        if let Some(frame) = self.cache.get_mut(&page) {
            frame.dirty = true;
        }
    }

    /// Reads the record stored under `key`.
    ///
    /// Fails with [`LofError::MissingKey`] if the key was never inserted;
    /// a failed lookup does not count as an access.
    pub fn get(&mut self, key: RecordId) -> Result<&V> {
        if !self.records.contains_key(&key) {
            return Err(LofError::MissingKey(key));
        }
        let page = self.page_of(key);
        self.touch(page);
        self.stats.logical_reads += 1;
        self.records.get(&key).ok_or(LofError::MissingKey(key))
    }

    /// Inserts or overwrites the record stored under `key`.
    pub fn put(&mut self, key: RecordId, value: V) {
        let page = self.page_of(key);
        self.touch(page);
        self.mark_dirty(page);
        self.stats.logical_writes += 1;
        self.records.insert(key, value);
    }

    /// Reads the record under `key`, applies `f` to it, and writes it back.
    ///
    /// Counts one logical read and one logical write.
    pub fn update<R>(&mut self, key: RecordId, f: impl FnOnce(&mut V) -> R) -> Result<R> {
        let page = self.page_of(key);
        let Some(record) = self.records.get_mut(&key) else {
            return Err(LofError::MissingKey(key));
        };
        let out = f(record);
        self.touch(page);
        self.mark_dirty(page);
        self.stats.logical_reads += 1;
        self.stats.logical_writes += 1;
        Ok(out)
    }

    /// Returns whether a record exists under `key`, without counting an
    /// access.
    pub fn contains(&self, key: RecordId) -> bool {
        self.records.contains_key(&key)
    }

    /// Number of records in the logical store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the logical store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes back every dirty resident page, counting physical writes.
    pub fn flush(&mut self) {
        for (page, frame) in self.cache.iter_mut() {
            if frame.dirty {
                frame.dirty = false;
                self.stats.physical_writes += 1;
            }
            self.materialized.insert(*page);
        }
    }

    /// Current access counters.
    pub fn stats(&self) -> AccessStats {
        self.stats
    }

    /// Zeroes the access counters. Store contents are unaffected.
    pub fn reset_stats(&mut self) {
        self.stats = AccessStats::default();
    }
}
