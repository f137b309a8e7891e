#![allow(missing_docs)]

use lofline::{BatchLof, Database, LofError, LofOptions, MemoryDatabase, ObjectId, Result};

/// The 1-D running example: a tight cluster {0, 1, 2} and a loose pair
/// {10, 11}. Ids follow insertion order.
fn scenario_database() -> MemoryDatabase {
    let mut db = MemoryDatabase::new();
    for value in [0.0, 1.0, 2.0, 10.0, 11.0] {
        db.insert(vec![value]).expect("insert");
    }
    db
}

#[test]
fn five_point_scenario_builds_expected_tables() -> Result<()> {
    let db = scenario_database();
    let dist = db.distance_function();
    let mut tables = BatchLof::new(LofOptions::new(2))?.run(&db, &dist)?;

    // Neighbor list of point 10 (id 3): 11 at distance 1, then 2 at 8.
    let list = tables.neighbor_table().neighbors(3)?;
    let entries: Vec<(ObjectId, f64)> = list.iter().map(|n| (n.id, n.distance)).collect();
    assert_eq!(entries, vec![(4, 1.0), (2, 8.0)]);
    assert_eq!(list[0].reachability, 9.0, "max(1, kdist(11)=9)");
    assert_eq!(list[1].reachability, 8.0, "max(8, kdist(2)=2)");

    // Neighbor list of point 2 (id 2): 1 at distance 1, then 0 at 2.
    let list = tables.neighbor_table().neighbors(2)?;
    let entries: Vec<(ObjectId, f64)> = list.iter().map(|n| (n.id, n.distance)).collect();
    assert_eq!(entries, vec![(1, 1.0), (0, 2.0)]);

    // Aggregates, exact: the inputs are small integers.
    let expected_sum1 = [3.0, 4.0, 3.0, 17.0, 17.0];
    let expected_sum2: [&[f64]; 5] = [
        &[4.0, 3.0],
        &[3.0, 3.0],
        &[4.0, 3.0],
        &[17.0, 3.0],
        &[17.0, 3.0],
    ];
    for id in 0..5u64 {
        let entry = tables.lof_table().entry(id)?;
        assert_eq!(entry.sum1, expected_sum1[id as usize], "sum1 of {id}");
        assert_eq!(
            entry.sum2.as_slice(),
            expected_sum2[id as usize],
            "sum2 of {id}"
        );
    }

    // The sparse pair scores markedly above the cluster.
    let lof_10 = tables.lof(3)?;
    let lof_1 = tables.lof(1)?;
    assert!((lof_10 - 1.7).abs() < 1e-12, "lof(10) = {lof_10}");
    assert!((lof_1 - 4.0 / 3.0).abs() < 1e-12, "lof(1) = {lof_1}");
    assert!(lof_10 > 1.5 && lof_1 < 1.4);
    Ok(())
}

#[test]
fn batch_is_idempotent() -> Result<()> {
    let db = scenario_database();
    let dist = db.distance_function();
    let engine = BatchLof::new(LofOptions::new(2))?;
    let mut first = engine.run(&db, &dist)?;
    let mut second = engine.run(&db, &dist)?;

    for id in 0..db.len() as ObjectId {
        assert_eq!(
            first.neighbor_table().neighbors(id)?,
            second.neighbor_table().neighbors(id)?,
            "neighbor list of {id}"
        );
        assert_eq!(
            first.lof_table().entry(id)?,
            second.lof_table().entry(id)?,
            "aggregates of {id}"
        );
    }
    Ok(())
}

#[test]
fn batch_rejects_too_small_databases() -> Result<()> {
    let mut db = MemoryDatabase::new();
    db.insert(vec![0.0])?;
    db.insert(vec![1.0])?;
    let dist = db.distance_function();
    let result = BatchLof::new(LofOptions::new(2))?.run(&db, &dist);
    assert!(matches!(
        result,
        Err(LofError::InsufficientData { have: 1, need: 2 })
    ));
    Ok(())
}

#[test]
fn invalid_configuration_fails_before_any_work() {
    assert!(matches!(
        BatchLof::new(LofOptions::new(0)),
        Err(LofError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        BatchLof::new(LofOptions::new(2).page_size(4096).cache_size(100)),
        Err(LofError::InvalidConfiguration(_))
    ));
}
