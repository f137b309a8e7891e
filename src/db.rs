//! External collaborator interfaces: the object database that answers
//! (reverse) k-nearest-neighbor queries and the distance function it queries
//! under, plus in-memory reference implementations used by the tests and as
//! a small-data backend.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{LofError, Result};

/// Opaque, densely assigned object handle. Ordering is used only as a
/// deterministic tie-break between equal distances.
pub type ObjectId = u64;

/// One entry of a (reverse) nearest-neighbor query result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryResult {
    /// The matched object.
    pub id: ObjectId,
    /// Its distance to the query object.
    pub distance: f64,
}

/// Distance between two stored objects.
///
/// Implementations must be non-negative, symmetric, and deterministic for
/// fixed inputs.
pub trait DistanceFunction {
    /// Returns the distance between objects `a` and `b`.
    fn distance(&self, a: ObjectId, b: ObjectId) -> Result<f64>;
}

/// Object storage with neighborhood queries.
///
/// The LOF engines only consume this interface; they never mutate anything
/// behind it besides admitting new objects through [`Database::insert`].
pub trait Database {
    /// The stored object type.
    type Object;

    /// Admits an object and returns its assigned id.
    fn insert(&mut self, object: Self::Object) -> Result<ObjectId>;

    /// Number of stored objects.
    fn len(&self) -> usize;

    /// Returns whether the database is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh iterator over all current ids.
    fn ids(&self) -> Box<dyn Iterator<Item = ObjectId> + '_>;

    /// The `k` nearest neighbors of `id`, ascending by `(distance, id)`.
    ///
    /// The query object itself is part of the result (at distance zero,
    /// though coincident objects with smaller ids may outrank it).
    fn knn(&self, id: ObjectId, k: usize, dist: &dyn DistanceFunction)
        -> Result<Vec<QueryResult>>;

    /// All objects that have `id` among their own `k` nearest neighbors,
    /// ascending by `(distance, id)`. Includes the query object itself.
    fn reverse_knn(
        &self,
        id: ObjectId,
        k: usize,
        dist: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>>;
}

type SharedPoints = Arc<RwLock<Vec<Vec<f64>>>>;

/// In-memory database over dense points, answering queries by sequential
/// scan. Ids are assigned in insertion order starting at zero.
#[derive(Default)]
pub struct MemoryDatabase {
    points: SharedPoints,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a Euclidean distance function over this database's points.
    ///
    /// The function shares the backing storage, so it stays valid across
    /// later insertions.
    pub fn distance_function(&self) -> EuclideanDistance {
        EuclideanDistance {
            points: Arc::clone(&self.points),
        }
    }

    /// Returns a copy of the stored point, if present.
    pub fn point(&self, id: ObjectId) -> Option<Vec<f64>> {
        self.points.read().get(id as usize).cloned()
    }
}

impl Database for MemoryDatabase {
    type Object = Vec<f64>;

    fn insert(&mut self, object: Vec<f64>) -> Result<ObjectId> {
        let mut points = self.points.write();
        points.push(object);
        Ok((points.len() - 1) as ObjectId)
    }

    fn len(&self) -> usize {
        self.points.read().len()
    }

    fn ids(&self) -> Box<dyn Iterator<Item = ObjectId> + '_> {
        Box::new(0..self.len() as ObjectId)
    }

    fn knn(
        &self,
        id: ObjectId,
        k: usize,
        dist: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>> {
        let n = self.len() as ObjectId;
        let mut results = Vec::with_capacity(n as usize);
        for other in 0..n {
            results.push(QueryResult {
                id: other,
                distance: dist.distance(id, other)?,
            });
        }
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results.truncate(k);
        Ok(results)
    }

    fn reverse_knn(
        &self,
        id: ObjectId,
        k: usize,
        dist: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>> {
        let n = self.len() as ObjectId;
        let mut results = Vec::new();
        for other in 0..n {
            let neighborhood = self.knn(other, k, dist)?;
            if neighborhood.iter().any(|r| r.id == id) {
                results.push(QueryResult {
                    id: other,
                    distance: dist.distance(other, id)?,
                });
            }
        }
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(results)
    }
}

/// Euclidean distance over the points of a [`MemoryDatabase`].
pub struct EuclideanDistance {
    points: SharedPoints,
}

impl DistanceFunction for EuclideanDistance {
    fn distance(&self, a: ObjectId, b: ObjectId) -> Result<f64> {
        let points = self.points.read();
        let pa = points
            .get(a as usize)
            .ok_or_else(|| LofError::DistanceQuery(format!("unknown object {a}")))?;
        let pb = points
            .get(b as usize)
            .ok_or_else(|| LofError::DistanceQuery(format!("unknown object {b}")))?;
        if pa.len() != pb.len() {
            return Err(LofError::DistanceQuery(format!(
                "dimension mismatch between objects {a} and {b}"
            )));
        }
        let sum: f64 = pa
            .iter()
            .zip(pb.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        Ok(sum.sqrt())
    }
}
