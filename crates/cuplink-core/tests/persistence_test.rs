#![allow(clippy::unwrap_used)]
// `TransactionContext` over the in-memory pool: visibility of committed
// and rolled-back work, and connection release on every exit path.

use std::sync::Arc;

use cuplink_core::{
    MemoryPool, PersistenceError, SensorKind, SensorRecord, SensorRepository, TransactionContext,
};

fn reading(device_id: &str, value: f64) -> SensorRecord {
    SensorRecord::new(device_id, SensorKind::Temperature, value, 1_700_000_000_000)
}

#[test]
fn committed_unit_of_work_is_visible_to_other_workers() {
    let pool = Arc::new(MemoryPool::new(2));

    let mut writer = TransactionContext::new(Arc::clone(&pool));
    writer.begin().unwrap();
    writer.current().unwrap().upsert_reading(&reading("cup-1", 21.5)).unwrap();

    let mut reader = TransactionContext::new(Arc::clone(&pool));
    let before = reader
        .current()
        .unwrap()
        .latest_reading("cup-1", SensorKind::Temperature)
        .unwrap();
    assert!(before.is_none());
    reader.release();

    writer.commit().unwrap();
    assert!(!writer.is_bound());

    let after = reader
        .current()
        .unwrap()
        .latest_reading("cup-1", SensorKind::Temperature)
        .unwrap();
    assert_eq!(after, Some(reading("cup-1", 21.5)));
    assert!(!reader.in_transaction());
}

#[test]
fn rollback_discards_work_and_releases() {
    let pool = Arc::new(MemoryPool::new(1));

    let mut tx = TransactionContext::new(Arc::clone(&pool));
    tx.begin().unwrap();
    tx.current().unwrap().upsert_reading(&reading("cup-1", 21.5)).unwrap();
    tx.rollback().unwrap();

    assert!(!tx.is_bound());
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.row_count(), 0);
}

#[test]
fn release_twice_is_harmless() {
    let pool = Arc::new(MemoryPool::new(1));
    let mut tx = TransactionContext::new(Arc::clone(&pool));

    tx.current().unwrap();
    tx.release();
    tx.release();

    assert!(!tx.is_bound());
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn dropped_context_rolls_back_open_transaction() {
    let pool = Arc::new(MemoryPool::new(1));
    {
        let mut tx = TransactionContext::new(Arc::clone(&pool));
        tx.begin().unwrap();
        tx.current().unwrap().upsert_reading(&reading("cup-1", 21.5)).unwrap();
    }

    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.row_count(), 0);
}

#[test]
fn scoped_work_commits_or_rolls_back() {
    let pool = Arc::new(MemoryPool::new(1));

    TransactionContext::scoped(Arc::clone(&pool), |conn| {
        conn.upsert_reading(&reading("cup-1", 21.5))
    })
    .unwrap();

    let failed: Result<(), PersistenceError> = TransactionContext::scoped(Arc::clone(&pool), |conn| {
        conn.upsert_reading(&reading("cup-2", 30.0))?;
        Err(PersistenceError::Query {
            reason: "constraint violated".into(),
        })
    });

    assert!(matches!(failed, Err(PersistenceError::Query { .. })));
    assert!(pool.committed("cup-1", SensorKind::Temperature).is_some());
    assert!(pool.committed("cup-2", SensorKind::Temperature).is_none());
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn exhausted_pool_prevents_unit_of_work() {
    let pool = Arc::new(MemoryPool::new(1));
    let mut holder = TransactionContext::new(Arc::clone(&pool));
    holder.begin().unwrap();

    let mut blocked = TransactionContext::new(Arc::clone(&pool));
    assert!(matches!(
        blocked.begin(),
        Err(PersistenceError::PoolExhausted { max: 1 })
    ));
    assert!(!blocked.is_bound());

    holder.commit().unwrap();
    blocked.begin().unwrap();
    assert!(blocked.in_transaction());
}
