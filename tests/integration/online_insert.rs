#![allow(missing_docs)]

use lofline::{
    BatchLof, Database, DistanceFunction, LofError, LofOptions, LofTables, MemoryDatabase,
    ObjectId, OnlineLof, Result,
};

const TOLERANCE: f64 = 1e-9;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * 1.0_f64.max(a.abs()).max(b.abs())
}

/// Asserts both table pairs describe the same state for ids `0..n`.
fn assert_tables_match(left: &mut LofTables, right: &mut LofTables, n: usize) {
    for id in 0..n as ObjectId {
        let a = left.neighbor_table().neighbors(id).expect("left list");
        let b = right.neighbor_table().neighbors(id).expect("right list");
        assert_eq!(a.len(), b.len(), "list length of {id}");
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id, "neighbor ids of {id}");
            assert_eq!(x.rank, y.rank, "neighbor ranks of {id}");
            assert!(close(x.distance, y.distance), "distances of {id}");
            assert!(
                close(x.reachability, y.reachability),
                "reachability of {id}: {} vs {}",
                x.reachability,
                y.reachability
            );
        }
        let ea = left.lof_table().entry(id).expect("left entry");
        let eb = right.lof_table().entry(id).expect("right entry");
        assert!(
            close(ea.sum1, eb.sum1),
            "sum1 of {id}: {} vs {}",
            ea.sum1,
            eb.sum1
        );
        for (i, (x, y)) in ea.sum2.iter().zip(eb.sum2.iter()).enumerate() {
            assert!(close(*x, *y), "sum2[{i}] of {id}: {x} vs {y}");
        }
    }
}

#[test]
fn incremental_scenario_matches_batch() -> Result<()> {
    let points = [0.0, 1.0, 2.0, 10.0, 11.0];
    let options = LofOptions::new(2);

    let mut batch_db = MemoryDatabase::new();
    for value in points {
        batch_db.insert(vec![value])?;
    }
    let batch_dist = batch_db.distance_function();
    let mut batch = BatchLof::new(options.clone())?.run(&batch_db, &batch_dist)?;

    let mut db = MemoryDatabase::new();
    let dist = db.distance_function();
    let mut engine = OnlineLof::new(options)?;
    for value in points {
        match engine.insert(&mut db, &dist, vec![value]) {
            Ok(_) => {}
            // The first two objects are admitted but leave too little data
            // for any neighborhood; the third insertion bootstraps.
            Err(LofError::InsufficientData { .. }) => {}
            Err(other) => return Err(other),
        }
    }

    assert_tables_match(&mut batch, engine.tables(), points.len());

    let lof_10 = engine.lof(3)?;
    let lof_1 = engine.lof(1)?;
    assert!(
        lof_10 > 1.5 && lof_1 < 1.4,
        "sparse pair must score above the cluster: {lof_10} vs {lof_1}"
    );
    Ok(())
}

#[test]
fn insufficient_data_still_admits_the_object() -> Result<()> {
    let mut db = MemoryDatabase::new();
    let dist = db.distance_function();
    let mut engine = OnlineLof::new(LofOptions::new(2))?;

    for value in [0.0, 1.0] {
        let result = engine.insert(&mut db, &dist, vec![value]);
        assert!(matches!(result, Err(LofError::InsufficientData { .. })));
    }
    assert_eq!(db.len(), 2, "failed insertions still admit objects");
    assert!(engine.tables().is_empty());

    engine.insert(&mut db, &dist, vec![2.0])?;
    assert_eq!(engine.tables().len(), 3, "bootstrap covers earlier objects");
    Ok(())
}

#[test]
fn coincident_points_rank_by_id() -> Result<()> {
    let points = [0.0, 1.0, 2.0, 1.0];
    let options = LofOptions::new(2);

    let mut db = MemoryDatabase::new();
    let dist = db.distance_function();
    let mut engine = OnlineLof::new(options.clone())?;
    for value in points {
        match engine.insert(&mut db, &dist, vec![value]) {
            Ok(_) | Err(LofError::InsufficientData { .. }) => {}
            Err(other) => return Err(other),
        }
    }

    // Object 3 coincides with object 1; each must hold the other first.
    let list = engine.tables().neighbor_table().neighbors(1)?;
    assert_eq!(list[0].id, 3, "coincident neighbor at distance zero");
    assert_eq!(list[0].distance, 0.0);
    let list = engine.tables().neighbor_table().neighbors(3)?;
    assert_eq!(list[0].id, 1);

    // And the incremental state still matches a fresh batch run.
    let mut batch = BatchLof::new(options)?.run(&db, &dist)?;
    assert_tables_match(&mut batch, engine.tables(), points.len());
    Ok(())
}

struct FailingDistance;

impl DistanceFunction for FailingDistance {
    fn distance(&self, _a: ObjectId, _b: ObjectId) -> Result<f64> {
        Err(LofError::DistanceQuery("collaborator offline".into()))
    }
}

#[test]
fn distance_failure_aborts_the_insertion() -> Result<()> {
    let mut db = MemoryDatabase::new();
    let dist = db.distance_function();
    let mut engine = OnlineLof::new(LofOptions::new(2))?;
    for value in [0.0, 1.0, 2.0, 3.0] {
        match engine.insert(&mut db, &dist, vec![value]) {
            Ok(_) | Err(LofError::InsufficientData { .. }) => {}
            Err(other) => return Err(other),
        }
    }

    let result = engine.insert(&mut db, &FailingDistance, vec![4.0]);
    assert!(matches!(result, Err(LofError::DistanceQuery(_))));
    Ok(())
}

#[test]
fn resuming_from_batch_tables_matches_full_batch() -> Result<()> {
    let options = LofOptions::new(2);

    let mut db = MemoryDatabase::new();
    for value in [0.0, 1.0, 2.0] {
        db.insert(vec![value])?;
    }
    let dist = db.distance_function();
    let tables = BatchLof::new(options.clone())?.run(&db, &dist)?;

    let mut engine = OnlineLof::from_tables(options.clone(), tables)?;
    engine.insert(&mut db, &dist, vec![10.0])?;
    engine.insert(&mut db, &dist, vec![11.0])?;

    let mut batch = BatchLof::new(options)?.run(&db, &dist)?;
    assert_tables_match(&mut batch, engine.tables(), db.len());
    Ok(())
}
