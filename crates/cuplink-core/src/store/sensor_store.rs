// ── Concurrent latest-value cache ──
//
// One slot per (device, sensor kind). A write swaps the whole `Arc` in the
// slot, so readers see either the previous record or the new one, never a
// mix. Writes are unconditional: the last call wins regardless of the
// embedded timestamp.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::{SensorKind, SensorRecord};

/// Thread-safe, lock-free store of the most recent reading per sensor.
///
/// Reads are wait-free clones of an `Arc`; writes take a per-shard lock
/// inside `DashMap` only for the duration of the pointer swap.
#[derive(Default)]
pub struct SensorStore {
    records: DashMap<(String, SensorKind), Arc<SensorRecord>>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reading for `(device_id, kind)`.
    pub fn set_record(
        &self,
        device_id: &str,
        kind: SensorKind,
        value: f64,
        observed_at_epoch_millis: i64,
    ) -> Arc<SensorRecord> {
        let record = Arc::new(SensorRecord::new(
            device_id,
            kind,
            value,
            observed_at_epoch_millis,
        ));
        self.records
            .insert((device_id.to_owned(), kind), Arc::clone(&record));

        tracing::trace!(device_id, sensor = %kind, value, "sensor record stored");
        record
    }

    /// Most recent reading, or `None` if the device never pushed one.
    pub fn get_record(&self, device_id: &str, kind: SensorKind) -> Option<Arc<SensorRecord>> {
        self.records
            .get(&(device_id.to_owned(), kind))
            .map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn absent_before_first_write() {
        let store = SensorStore::new();
        for kind in SensorKind::iter() {
            assert!(store.get_record("cup-1", kind).is_none());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn last_call_wins_regardless_of_timestamp() {
        let store = SensorStore::new();
        store.set_record("cup-1", SensorKind::Temperature, 21.5, 2_000);
        store.set_record("cup-1", SensorKind::Temperature, 22.0, 1_000);

        let record = store.get_record("cup-1", SensorKind::Temperature).unwrap();
        assert!((record.value - 22.0).abs() < f64::EPSILON);
        assert_eq!(record.observed_at_epoch_millis, 1_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn kinds_are_independent() {
        let store = SensorStore::new();
        store.set_record("cup-1", SensorKind::Level, 0.5, 1);

        assert!(store.get_record("cup-1", SensorKind::Temperature).is_none());
        assert!(store.get_record("cup-2", SensorKind::Level).is_none());
        assert!(store.get_record("cup-1", SensorKind::Level).is_some());
    }

    #[test]
    fn concurrent_writers_never_tear_records() {
        let store = Arc::new(SensorStore::new());

        let writers: Vec<_> = (0..8_i32)
            .map(|w| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        // value and timestamp are written together; a reader
                        // must always see them paired.
                        store.set_record("cup-1", SensorKind::Temperature, f64::from(w), i64::from(w));
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    if let Some(r) = store.get_record("cup-1", SensorKind::Temperature) {
                        assert_eq!(r.value.to_string(), r.observed_at_epoch_millis.to_string());
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(store.len(), 1);
    }
}
