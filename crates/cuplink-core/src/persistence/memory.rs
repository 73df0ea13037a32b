// ── In-memory connection pool ──
//
// A bounded pool over a shared sensor table. Transactional connections
// stage their writes and apply them on commit; closing an uncommitted
// connection discards them. Used by the binary when no external database
// is wired in, and by tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use super::pool::{ConnectionPool, PooledConnection, SensorRepository};
use crate::error::PersistenceError;
use crate::model::{SensorKind, SensorRecord};

type SensorTable = DashMap<(String, SensorKind), SensorRecord>;

/// Bounded pool of [`MemoryConnection`]s sharing one sensor table.
#[derive(Debug)]
pub struct MemoryPool {
    table: Arc<SensorTable>,
    max_connections: usize,
    in_use: Arc<AtomicUsize>,
}

impl MemoryPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            max_connections,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Committed row for `(device_id, kind)`, bypassing any connection.
    pub fn committed(&self, device_id: &str, kind: SensorKind) -> Option<SensorRecord> {
        self.table
            .get(&(device_id.to_owned(), kind))
            .map(|r| r.value().clone())
    }

    pub fn row_count(&self) -> usize {
        self.table.len()
    }
}

impl ConnectionPool for MemoryPool {
    type Conn = MemoryConnection;

    fn acquire(&self) -> Result<MemoryConnection, PersistenceError> {
        let max = self.max_connections;
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| PersistenceError::PoolExhausted { max })?;

        Ok(MemoryConnection {
            table: Arc::clone(&self.table),
            in_use: Arc::clone(&self.in_use),
            auto_commit: true,
            staged: Vec::new(),
            closed: false,
        })
    }
}

/// A checked-out connection. Returns its slot to the pool on close or drop.
#[derive(Debug)]
pub struct MemoryConnection {
    table: Arc<SensorTable>,
    in_use: Arc<AtomicUsize>,
    auto_commit: bool,
    staged: Vec<SensorRecord>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), PersistenceError> {
        if self.closed {
            return Err(PersistenceError::Query {
                reason: "connection is closed".into(),
            });
        }
        Ok(())
    }

    fn apply_staged(&mut self) {
        for record in self.staged.drain(..) {
            self.table
                .insert((record.device_id.clone(), record.sensor_kind), record);
        }
    }

    fn return_to_pool(&mut self) {
        if !self.closed {
            self.closed = true;
            self.in_use.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl PooledConnection for MemoryConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        if auto_commit && !self.auto_commit {
            self.apply_staged();
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        self.apply_staged();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        self.staged.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), PersistenceError> {
        self.staged.clear();
        self.return_to_pool();
        Ok(())
    }
}

impl SensorRepository for MemoryConnection {
    fn upsert_reading(&mut self, record: &SensorRecord) -> Result<(), PersistenceError> {
        self.ensure_open()?;
        if self.auto_commit {
            self.table
                .insert((record.device_id.clone(), record.sensor_kind), record.clone());
        } else {
            self.staged.push(record.clone());
        }
        Ok(())
    }

    fn latest_reading(
        &mut self,
        device_id: &str,
        kind: SensorKind,
    ) -> Result<Option<SensorRecord>, PersistenceError> {
        self.ensure_open()?;
        let staged = self
            .staged
            .iter()
            .rev()
            .find(|r| r.device_id == device_id && r.sensor_kind == kind);
        if let Some(record) = staged {
            return Ok(Some(record.clone()));
        }
        Ok(self
            .table
            .get(&(device_id.to_owned(), kind))
            .map(|r| r.value().clone()))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}
