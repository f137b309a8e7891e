//! Single-object insertion with cascading table updates.

use smallvec::SmallVec;
use tracing::debug;

use super::batch::BatchLof;
use crate::db::{Database, DistanceFunction, ObjectId, QueryResult};
use crate::error::{LofError, Result};
use crate::options::LofOptions;
use crate::tables::{rank_of, LofEntry, LofTables, Neighbor};

/// Online LOF maintenance: inserts objects one at a time and keeps the
/// paired tables equal to what a fresh batch run over the grown database
/// would produce, touching only the objects whose neighborhoods changed.
///
/// An insertion is one atomic logical operation; it must run to completion
/// before the next one starts. If a collaborator query fails mid-cascade the
/// tables are left inconsistent and must be rebuilt with [`BatchLof`].
pub struct OnlineLof {
    options: LofOptions,
    tables: LofTables,
    initialized: bool,
}

impl OnlineLof {
    /// Creates an engine with empty tables.
    ///
    /// The tables stay empty until the database holds `min_pts + 1`
    /// objects; the first insertion at or past that point populates them
    /// with a batch pass over the full contents.
    pub fn new(options: LofOptions) -> Result<Self> {
        options.validate()?;
        let tables = LofTables::new(&options)?;
        Ok(Self {
            options,
            tables,
            initialized: false,
        })
    }

    /// Creates an engine that resumes from batch-built tables covering the
    /// database's current contents.
    pub fn from_tables(options: LofOptions, tables: LofTables) -> Result<Self> {
        options.validate()?;
        let initialized = !tables.is_empty();
        Ok(Self {
            options,
            tables,
            initialized,
        })
    }

    /// The maintained tables.
    pub fn tables(&mut self) -> &mut LofTables {
        &mut self.tables
    }

    /// Consumes the engine, returning the tables.
    pub fn into_tables(self) -> LofTables {
        self.tables
    }

    /// The LOF value of `id`.
    pub fn lof(&mut self, id: ObjectId) -> Result<f64> {
        self.tables.lof(id)
    }

    /// Admits `object` into the database and updates the tables.
    ///
    /// The object is admitted first in every case. While the tables are
    /// still unpopulated, an insertion that leaves fewer than `min_pts`
    /// other objects fails with [`LofError::InsufficientData`]; the object
    /// stays admitted and a later insertion bootstraps over it.
    pub fn insert<D, F>(&mut self, db: &mut D, dist: &F, object: D::Object) -> Result<ObjectId>
    where
        D: Database,
        F: DistanceFunction,
    {
        let id = db.insert(object)?;
        if !self.initialized {
            let have = db.len().saturating_sub(1);
            if have < self.options.min_pts {
                return Err(LofError::InsufficientData {
                    have,
                    need: self.options.min_pts,
                });
            }
            debug!(objects = db.len(), "bootstrapping tables from batch pass");
            BatchLof::new(self.options.clone())?.run_into(&mut self.tables, db, dist)?;
            self.initialized = true;
            return Ok(id);
        }
        self.cascade(db, dist, id)?;
        Ok(id)
    }

    /// The incremental update proper: seed the new object's rows, then
    /// propagate neighbor-set changes and reachability-distance changes to
    /// everything within two reverse-neighbor hops.
    fn cascade<D, F>(&mut self, db: &D, dist: &F, o: ObjectId) -> Result<()>
    where
        D: Database,
        F: DistanceFunction,
    {
        let min_pts = self.options.min_pts;

        let mut neighbors = db.knn(o, min_pts + 1, dist)?;
        neighbors.retain(|r| r.id != o);
        neighbors.truncate(min_pts);
        if neighbors.len() < min_pts {
            return Err(LofError::InsufficientData {
                have: neighbors.len(),
                need: min_pts,
            });
        }
        let mut reverse = db.reverse_knn(o, min_pts + 1, dist)?;
        reverse.retain(|r| r.id != o);
        debug!(id = o, knn = ?neighbors, rknn = ?reverse, "inserting object");

        self.seed(o, &neighbors)?;

        // The new object's own k-distance, fixed for the whole cascade: its
        // list cannot change while it is being inserted.
        let k_dist_o = neighbors[min_pts - 1].distance;

        let knn_distances = self.apply_neighbor_changes(dist, o, k_dist_o, &reverse)?;
        self.apply_reachability_changes(&knn_distances)?;
        Ok(())
    }

    /// Populates the new object's neighbor list and aggregate entry from
    /// the tables as they stand before the cascade runs.
    fn seed(&mut self, o: ObjectId, neighbors: &[QueryResult]) -> Result<()> {
        let mut sum1 = 0.0;
        let mut sum2: SmallVec<[f64; 8]> = SmallVec::with_capacity(neighbors.len());
        for (rank, result) in neighbors.iter().enumerate() {
            let p = result.id;
            let k_dist_p = self.tables.neighbors.k_distance(p)?;
            let reachability = result.distance.max(k_dist_p);
            self.tables.neighbors.insert(Neighbor {
                owner: o,
                rank,
                id: p,
                reachability,
                distance: result.distance,
            })?;
            sum1 += reachability;
            sum2.push(self.tables.neighbors.sum_of_reachability(p)?);
        }
        let entry = LofEntry::new(sum1, sum2);
        debug!(id = o, ?entry, "seeded aggregates");
        self.tables.lofs.insert(o, entry);
        Ok(())
    }

    /// Phase one of the cascade: `o` displaces the previous k-th neighbor
    /// of every reverse neighbor `p`, which shifts `p`'s list and sums and
    /// dirties the cached copies held by everything that counts `p` among
    /// its neighbors.
    ///
    /// Returns, per reverse neighbor, the k-distance it has now that `o`
    /// is in its list — phase two needs it.
    fn apply_neighbor_changes<F>(
        &mut self,
        dist: &F,
        o: ObjectId,
        k_dist_o: f64,
        reverse: &[QueryResult],
    ) -> Result<Vec<(ObjectId, f64)>>
    where
        F: DistanceFunction,
    {
        let min_pts = self.options.min_pts;
        let mut knn_distances = Vec::with_capacity(reverse.len());

        for result in reverse {
            let p = result.id;
            let dist_po = dist.distance(p, o)?;
            let reach_po = k_dist_o.max(dist_po);

            let old_list = self.tables.neighbors.neighbors(p)?;
            // The k-distance p will have once o displaces its previous k-th
            // neighbor: o's distance or the (k-1)-th entry, whichever is
            // larger.
            let prev = if min_pts >= 2 {
                old_list
                    .get(min_pts - 2)
                    .map(|n| n.distance)
                    .ok_or(LofError::MissingKey(p))?
            } else {
                f64::NEG_INFINITY
            };
            knn_distances.push((p, dist_po.max(prev)));

            let rank = rank_of(&old_list, dist_po, o);
            let evicted = self.tables.neighbors.insert_and_move(Neighbor {
                owner: p,
                rank,
                id: o,
                reachability: reach_po,
                distance: dist_po,
            })?;
            debug!(
                owner = p,
                inserted = o,
                rank,
                evicted = evicted.id,
                "neighbor list updated"
            );

            let delta = reach_po - evicted.reachability;
            self.tables.lofs.adjust_sum1(p, delta)?;

            // p gained a neighbor at `rank`; its cached per-neighbor sums
            // shift alongside, seeded with o's current list total.
            let sum_reach_o = self.tables.neighbors.sum_of_reachability(o)?;
            self.tables.lofs.insert_and_move_sum2(p, rank, sum_reach_o)?;

            // Everything holding p as a neighbor caches p's list total in
            // sum2; only one summand of that total changed.
            for q in &self.tables.neighbors.reverse_neighbors(p)? {
                self.tables.lofs.adjust_sum2(q.owner, q.rank, delta)?;
            }
        }
        Ok(knn_distances)
    }

    /// Phase two of the cascade: a changed k-distance of a reverse neighbor
    /// `p` can raise or lower the reachability distance of every object
    /// that has `p` in its list, which in turn dirties their sums and their
    /// reverse neighbors' cached copies.
    fn apply_reachability_changes(&mut self, knn_distances: &[(ObjectId, f64)]) -> Result<()> {
        for &(p, knn_distance_p) in knn_distances {
            for q in &self.tables.neighbors.reverse_neighbors(p)? {
                let old_reach = q.reachability;
                let new_reach = q.distance.max(knn_distance_p);
                if new_reach != old_reach {
                    self.tables
                        .neighbors
                        .set_reachability(q.owner, q.rank, new_reach)?;
                    let delta = new_reach - old_reach;
                    debug!(owner = q.owner, rank = q.rank, delta, "reachability updated");
                    self.tables.lofs.adjust_sum1(q.owner, delta)?;
                    for r in &self.tables.neighbors.reverse_neighbors(q.owner)? {
                        self.tables.lofs.adjust_sum2(r.owner, r.rank, delta)?;
                    }
                }
            }
        }
        Ok(())
    }
}
