//! The paired record tables behind both LOF engines.
//!
//! [`NeighborTable`] and [`LofTable`] always travel together: the neighbor
//! lists define which reachability distances exist, the aggregate entries
//! cache their sums. [`LofTables`] bundles one of each and derives LOF
//! values from them.

mod lof;
mod neighbors;

pub use lof::{LofEntry, LofTable};
pub use neighbors::{rank_of, Neighbor, NeighborList, NeighborTable};

use crate::db::ObjectId;
use crate::error::Result;
use crate::options::LofOptions;
use crate::store::AccessStats;

/// A neighbor table and its aggregate table, built from one configuration.
pub struct LofTables {
    pub(crate) neighbors: NeighborTable,
    pub(crate) lofs: LofTable,
}

impl LofTables {
    /// Creates an empty pair.
    pub fn new(options: &LofOptions) -> Result<Self> {
        Ok(Self {
            neighbors: NeighborTable::new(options)?,
            lofs: LofTable::new(options)?,
        })
    }

    /// Neighborhood size k.
    pub fn min_pts(&self) -> usize {
        self.neighbors.min_pts()
    }

    /// Number of objects covered by the tables.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Returns whether the tables hold no objects yet.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// The neighbor table.
    pub fn neighbor_table(&mut self) -> &mut NeighborTable {
        &mut self.neighbors
    }

    /// The aggregate table.
    pub fn lof_table(&mut self) -> &mut LofTable {
        &mut self.lofs
    }

    /// The LOF value of `id`: its average reachability distance divided by
    /// the average of its neighbors' average reachability distances.
    ///
    /// Fully coincident data (every reachability distance zero) yields the
    /// neutral ratio 1.0.
    pub fn lof(&mut self, id: ObjectId) -> Result<f64> {
        let entry = self.lofs.entry(id)?;
        let k = self.min_pts() as f64;
        let sum2_total = entry.sum2_total();
        if entry.sum1 == 0.0 && sum2_total == 0.0 {
            return Ok(1.0);
        }
        Ok((entry.sum1 / k) / (sum2_total / (k * k)))
    }

    /// Access counters of the neighbor table's store.
    pub fn neighbor_stats(&self) -> AccessStats {
        self.neighbors.stats()
    }

    /// Access counters of the aggregate table's store.
    pub fn lof_stats(&self) -> AccessStats {
        self.lofs.stats()
    }

    /// Zeroes both tables' access counters.
    pub fn reset_stats(&mut self) {
        self.neighbors.reset_stats();
        self.lofs.reset_stats();
    }
}
