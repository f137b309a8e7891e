//! Three-phase full LOF computation.

use smallvec::SmallVec;
use tracing::info;

use crate::db::{Database, DistanceFunction, ObjectId};
use crate::error::{LofError, Result};
use crate::options::LofOptions;
use crate::tables::{LofEntry, LofTables, Neighbor};

/// Batch LOF computation over a whole database.
///
/// Three sequential full passes: neighbor discovery, reachability-distance
/// materialization, sum aggregation. Each phase reads only state the
/// previous phase finished writing, so the result is independent of the
/// visitation order within a phase.
pub struct BatchLof {
    options: LofOptions,
}

impl BatchLof {
    /// Creates a batch engine for the given configuration.
    pub fn new(options: LofOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Builds fresh tables covering every object in `db`.
    pub fn run<D, F>(&self, db: &D, dist: &F) -> Result<LofTables>
    where
        D: Database,
        F: DistanceFunction,
    {
        let mut tables = LofTables::new(&self.options)?;
        self.run_into(&mut tables, db, dist)?;
        report_page_access(&tables);
        Ok(tables)
    }

    /// Runs the three phases into existing (empty) tables.
    pub(crate) fn run_into<D, F>(&self, tables: &mut LofTables, db: &D, dist: &F) -> Result<()>
    where
        D: Database,
        F: DistanceFunction,
    {
        let min_pts = self.options.min_pts;

        info!(objects = db.len(), min_pts, "computing neighborhoods");
        let ids: Vec<ObjectId> = db.ids().collect();
        for &id in &ids {
            compute_neighbors(tables, db, dist, id, min_pts)?;
        }

        info!("computing reachability distances");
        for &id in &ids {
            tables.neighbors.compute_reachability(id)?;
        }

        info!("computing lof aggregates");
        for &id in &ids {
            compute_aggregates(tables, id)?;
        }
        Ok(())
    }
}

/// Queries `id`'s `min_pts + 1` nearest neighbors, drops the self entry, and
/// populates its ranked list.
fn compute_neighbors<D, F>(
    tables: &mut LofTables,
    db: &D,
    dist: &F,
    id: ObjectId,
    min_pts: usize,
) -> Result<()>
where
    D: Database,
    F: DistanceFunction,
{
    let mut neighbors = db.knn(id, min_pts + 1, dist)?;
    neighbors.retain(|r| r.id != id);
    if neighbors.len() < min_pts {
        return Err(LofError::InsufficientData {
            have: neighbors.len(),
            need: min_pts,
        });
    }
    for (rank, result) in neighbors.iter().take(min_pts).enumerate() {
        tables.neighbors.insert(Neighbor {
            owner: id,
            rank,
            id: result.id,
            reachability: 0.0,
            distance: result.distance,
        })?;
    }
    Ok(())
}

/// Sums `id`'s reachability distances and those of each of its neighbors'
/// lists into a fresh aggregate entry.
fn compute_aggregates(tables: &mut LofTables, id: ObjectId) -> Result<()> {
    let list = tables.neighbors.neighbors(id)?;
    let mut sum1 = 0.0;
    let mut sum2: SmallVec<[f64; 8]> = SmallVec::with_capacity(list.len());
    for neighbor in &list {
        sum1 += neighbor.reachability;
        sum2.push(tables.neighbors.sum_of_reachability(neighbor.id)?);
    }
    tables.lofs.insert(id, LofEntry::new(sum1, sum2));
    Ok(())
}

/// Logs both tables' physical and logical access counters, the diagnostic
/// tail of every run.
fn report_page_access(tables: &LofTables) {
    let nn = tables.neighbor_stats();
    let lof = tables.lof_stats();
    info!(
        physical_reads = nn.physical_reads,
        physical_writes = nn.physical_writes,
        logical_reads = nn.logical_reads,
        logical_writes = nn.logical_writes,
        "neighbor table page access"
    );
    info!(
        physical_reads = lof.physical_reads,
        physical_writes = lof.physical_writes,
        logical_reads = lof.logical_reads,
        logical_writes = lof.logical_writes,
        "lof table page access"
    );
}
