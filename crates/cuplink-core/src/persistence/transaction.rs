// ── Unit-of-work context ──
//
// One `TransactionContext` per worker. It owns at most one pooled
// connection and guarantees that connection is closed on every exit
// path: commit, rollback, explicit release, or drop.

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use super::pool::{ConnectionPool, PooledConnection};
use crate::error::PersistenceError;

/// The connection currently bound to a unit of work.
struct TransactionHandle<C> {
    connection: C,
    auto_commit: bool,
}

/// Per-worker transactional handle over a shared [`ConnectionPool`].
///
/// Not `Clone`: the bound connection is owned by exactly one unit of work.
/// Pass `&mut TransactionContext` to the code that needs the connection.
///
/// ```rust,ignore
/// let mut tx = TransactionContext::new(Arc::clone(&pool));
/// tx.begin()?;
/// tx.current()?.upsert_reading(&record)?;
/// tx.commit()?;
/// ```
pub struct TransactionContext<P: ConnectionPool> {
    pool: Arc<P>,
    unit_id: Uuid,
    handle: Option<TransactionHandle<P::Conn>>,
}

impl<P: ConnectionPool> TransactionContext<P> {
    pub fn new(pool: Arc<P>) -> Self {
        Self {
            pool,
            unit_id: Uuid::new_v4(),
            handle: None,
        }
    }

    /// Identifier of this unit of work, for log correlation.
    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    /// `true` while a connection is bound.
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    /// `true` while a connection is bound with auto-commit disabled.
    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.auto_commit)
    }

    /// Start a transaction.
    ///
    /// Acquires a connection and disables auto-commit. A connection bound
    /// lazily by [`current`](Self::current) is switched to transactional
    /// mode instead of being replaced.
    pub fn begin(&mut self) -> Result<(), PersistenceError> {
        match self.handle.as_mut() {
            Some(handle) if !handle.auto_commit => return Err(PersistenceError::TransactionActive),
            Some(handle) => {
                handle.connection.set_auto_commit(false)?;
                handle.auto_commit = false;
            }
            None => {
                let mut connection = self.pool.acquire()?;
                if let Err(e) = connection.set_auto_commit(false) {
                    close_logged(self.unit_id, &mut connection);
                    return Err(e);
                }
                self.handle = Some(TransactionHandle {
                    connection,
                    auto_commit: false,
                });
            }
        }
        debug!(unit = %self.unit_id, "transaction started");
        Ok(())
    }

    /// The bound connection, acquiring an auto-commit one if nothing is bound.
    pub fn current(&mut self) -> Result<&mut P::Conn, PersistenceError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => TransactionHandle {
                connection: self.pool.acquire()?,
                auto_commit: true,
            },
        };
        Ok(&mut self.handle.insert(handle).connection)
    }

    /// Commit and release. A no-op when nothing is bound.
    ///
    /// The connection is released even when the commit fails; the commit
    /// error is returned.
    pub fn commit(&mut self) -> Result<(), PersistenceError> {
        let Some(mut handle) = self.handle.take() else {
            debug!(
                unit = %self.unit_id,
                "no connection bound to this unit of work, commit not attempted"
            );
            return Ok(());
        };
        let result = handle.connection.commit();
        close_logged(self.unit_id, &mut handle.connection);
        result
    }

    /// Roll back and release. A no-op when nothing is bound.
    pub fn rollback(&mut self) -> Result<(), PersistenceError> {
        let Some(mut handle) = self.handle.take() else {
            debug!(
                unit = %self.unit_id,
                "no connection bound to this unit of work, rollback not attempted"
            );
            return Ok(());
        };
        let result = handle.connection.rollback();
        close_logged(self.unit_id, &mut handle.connection);
        result
    }

    /// Close and unbind the connection, if any. Close failures are logged,
    /// never returned, so they can't mask the error that led here.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            close_logged(self.unit_id, &mut handle.connection);
        }
    }

    /// Run `work` inside a transaction on a fresh context.
    ///
    /// Commits on `Ok`, rolls back on `Err`. A rollback failure is logged
    /// and the work's own error is returned.
    pub fn scoped<T, E, F>(pool: Arc<P>, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut P::Conn) -> Result<T, E>,
        E: From<PersistenceError>,
    {
        let mut tx = Self::new(pool);
        tx.begin()?;

        let outcome = match tx.current() {
            Ok(connection) => work(connection),
            Err(e) => Err(E::from(e)),
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(unit = %tx.unit_id, error = %rollback_err, "rollback after failed unit of work failed");
                }
                Err(e)
            }
        }
    }
}

impl<P: ConnectionPool> Drop for TransactionContext<P> {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if !handle.auto_commit {
            warn!(unit = %self.unit_id, "unit of work dropped with an open transaction, rolling back");
            if let Err(e) = handle.connection.rollback() {
                error!(unit = %self.unit_id, error = %e, "rollback on drop failed");
            }
        }
        close_logged(self.unit_id, &mut handle.connection);
    }
}

fn close_logged<C: PooledConnection>(unit_id: Uuid, connection: &mut C) {
    if let Err(e) = connection.close() {
        error!(unit = %unit_id, error = %e, "error occurred while closing the connection");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
