//! Ranked nearest-neighbor lists with reverse-neighbor links.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::db::ObjectId;
use crate::error::{LofError, Result};
use crate::options::LofOptions;
use crate::store::{AccessStats, PagedRecordStore};

/// Conceptual on-page size of one neighbor: two ids, a rank, two doubles.
const NEIGHBOR_BYTES: usize = 36;

/// One entry of an object's nearest-neighbor list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// The object whose list this entry belongs to.
    pub owner: ObjectId,
    /// Position of this entry in the owner's list.
    pub rank: usize,
    /// The neighboring object.
    pub id: ObjectId,
    /// `max(distance, k-distance of id)`; zero until materialized.
    pub reachability: f64,
    /// Raw distance from the owner to the neighbor.
    pub distance: f64,
}

/// An owner's neighbor list, sorted ascending by `(distance, id)`.
pub type NeighborList = SmallVec<[Neighbor; 8]>;

/// Returns the rank at which a candidate at `distance` belongs in `list`.
///
/// This is the total order that decides every eviction: the first index
/// whose entry is farther, or equally far with a larger id.
pub fn rank_of(list: &[Neighbor], distance: f64, candidate: ObjectId) -> usize {
    list.iter()
        .position(|n| distance < n.distance || (distance == n.distance && candidate < n.id))
        .unwrap_or(list.len())
}

/// Per-object ranked k-nearest-neighbor lists over a paged record store,
/// with an index of reverse-neighbor back-references maintained alongside
/// every mutation.
pub struct NeighborTable {
    store: PagedRecordStore<NeighborList>,
    /// target id -> (owner id -> rank of target in owner's list).
    ///
    /// An owner holds a given target at exactly one rank; installing a
    /// second back-reference for the same pair is a bookkeeping bug.
    reverse: FxHashMap<ObjectId, FxHashMap<ObjectId, usize>>,
    min_pts: usize,
}

impl NeighborTable {
    /// Creates an empty table for lists of `options.min_pts` neighbors.
    pub fn new(options: &LofOptions) -> Result<Self> {
        options.validate()?;
        let store = PagedRecordStore::new(
            options.page_size,
            options.cache_size,
            NEIGHBOR_BYTES * options.min_pts,
        )?;
        Ok(Self {
            store,
            reverse: FxHashMap::default(),
            min_pts: options.min_pts,
        })
    }

    /// Neighborhood size k.
    pub fn min_pts(&self) -> usize {
        self.min_pts
    }

    /// Number of objects with a list in the table.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether no object has a list yet.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns whether `id` has a list in the table.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.store.contains(id)
    }

    fn link(&mut self, target: ObjectId, owner: ObjectId, rank: usize) {
        let previous = self.reverse.entry(target).or_default().insert(owner, rank);
        debug_assert!(
            previous.is_none(),
            "owner {owner} already holds target {target}"
        );
    }

    fn unlink(&mut self, target: ObjectId, owner: ObjectId) {
        if let Some(owners) = self.reverse.get_mut(&target) {
            owners.remove(&owner);
        }
    }

    fn relink(&mut self, target: ObjectId, owner: ObjectId, rank: usize) {
        if let Some(owners) = self.reverse.get_mut(&target) {
            if let Some(slot) = owners.get_mut(&owner) {
                *slot = rank;
            }
        }
    }

    /// Appends `neighbor` to its owner's list during first-time population.
    ///
    /// Neighbors must arrive in rank order; the list grows up to `min_pts`
    /// entries.
    pub fn insert(&mut self, neighbor: Neighbor) -> Result<()> {
        let owner = neighbor.owner;
        if !self.store.contains(owner) {
            self.store.put(owner, NeighborList::new());
        }
        self.link(neighbor.id, owner, neighbor.rank);
        let min_pts = self.min_pts;
        self.store.update(owner, move |list| {
            debug_assert_eq!(neighbor.rank, list.len(), "population out of rank order");
            debug_assert!(list.len() < min_pts, "list already full");
            list.push(neighbor);
        })
    }

    /// Inserts `neighbor` at its rank into an already-full list, shifting
    /// later entries right and returning the one that falls off the end.
    pub fn insert_and_move(&mut self, neighbor: Neighbor) -> Result<Neighbor> {
        let owner = neighbor.owner;
        let rank = neighbor.rank;
        let min_pts = self.min_pts;
        let (evicted, shifted) = self.store.update(owner, move |list| {
            debug_assert_eq!(list.len(), min_pts, "insert_and_move needs a full list");
            debug_assert!(rank < min_pts, "rank beyond list end");
            list.insert(rank, neighbor);
            let evicted = list.pop();
            let mut shifted: Vec<(ObjectId, usize)> = Vec::with_capacity(list.len() - rank);
            for i in rank + 1..list.len() {
                list[i].rank = i;
                shifted.push((list[i].id, i));
            }
            (evicted, shifted)
        })?;
        let evicted = evicted.ok_or(LofError::MissingKey(owner))?;
        self.unlink(evicted.id, owner);
        for (id, new_rank) in shifted {
            self.relink(id, owner, new_rank);
        }
        self.link(neighbor.id, owner, rank);
        Ok(evicted)
    }

    /// Returns a copy of `id`'s neighbor list.
    pub fn neighbors(&mut self, id: ObjectId) -> Result<NeighborList> {
        Ok(self.store.get(id)?.clone())
    }

    /// Returns copies of every list entry across the table whose neighbor is
    /// `id`, ordered by owner id.
    pub fn reverse_neighbors(&mut self, id: ObjectId) -> Result<NeighborList> {
        let mut refs: Vec<(ObjectId, usize)> = self
            .reverse
            .get(&id)
            .map(|owners| owners.iter().map(|(&o, &r)| (o, r)).collect())
            .unwrap_or_default();
        refs.sort_unstable_by_key(|&(owner, _)| owner);
        let mut out = NeighborList::new();
        for (owner, rank) in refs {
            let list = self.store.get(owner)?;
            let entry = *list.get(rank).ok_or(LofError::MissingKey(owner))?;
            debug_assert_eq!(entry.id, id, "reverse link out of sync");
            out.push(entry);
        }
        Ok(out)
    }

    /// Raw distance from `id` to its `min_pts`-th nearest neighbor.
    pub fn k_distance(&mut self, id: ObjectId) -> Result<f64> {
        let list = self.store.get(id)?;
        list.last()
            .map(|n| n.distance)
            .ok_or(LofError::MissingKey(id))
    }

    /// Materializes reachability distances for `id`'s list:
    /// `max(distance, k-distance of the neighbor)` per entry.
    ///
    /// Requires every referenced neighbor to have a complete list of its
    /// own, so this runs as a second pass after discovery.
    pub fn compute_reachability(&mut self, id: ObjectId) -> Result<()> {
        let list = self.neighbors(id)?;
        let mut values: Vec<f64> = Vec::with_capacity(list.len());
        for n in &list {
            let k_dist = self.k_distance(n.id)?;
            values.push(n.distance.max(k_dist));
        }
        self.store.update(id, move |list| {
            for (slot, value) in list.iter_mut().zip(values) {
                slot.reachability = value;
            }
        })
    }

    /// Overwrites the stored reachability distance of `owner`'s entry at
    /// `rank`.
    pub fn set_reachability(&mut self, owner: ObjectId, rank: usize, value: f64) -> Result<()> {
        let updated = self.store.update(owner, |list| {
            if let Some(slot) = list.get_mut(rank) {
                slot.reachability = value;
                true
            } else {
                false
            }
        })?;
        if updated {
            Ok(())
        } else {
            Err(LofError::MissingKey(owner))
        }
    }

    /// Sum of reachability distances across `id`'s current list.
    pub fn sum_of_reachability(&mut self, id: ObjectId) -> Result<f64> {
        Ok(self.store.get(id)?.iter().map(|n| n.reachability).sum())
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
