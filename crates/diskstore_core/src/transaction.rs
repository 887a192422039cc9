//! Thread-reentrant transactions with optional busy retry.
//!
//! Each thread tracks how deep it is inside transaction scopes of one
//! store. Only the outermost scope issues `BEGIN IMMEDIATE`, `COMMIT` and
//! `ROLLBACK`; nested scopes run inside it and share its fate.

use crate::config::RETRY_INTERVAL;
use crate::connection::SharedConnection;
use crate::error::{StoreError, StoreResult};
use diskstore_codec::Value;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Statement execution handle of an open transaction scope.
///
/// Everything executed through the handle belongs to the scope's
/// transaction and is committed or rolled back with it.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Transaction<'conn> {
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub(crate) fn connection(&self) -> &Connection {
        self.conn
    }

    /// Executes one statement, returning the number of changed rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params))?)
    }

    /// Executes one or more statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Runs a query and collects every row.
    pub fn query(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(values);
        }
        Ok(out)
    }

    /// Runs a query and returns its first row, if any.
    pub fn query_row(&self, sql: &str, params: &[Value]) -> StoreResult<Option<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params))?;
        match rows.next()? {
            Some(row) => Ok(Some(
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            None => Ok(None),
        }
    }
}

/// Scope depth per thread, valid for the process that recorded it.
struct Depths {
    pid: u32,
    by_thread: HashMap<ThreadId, usize>,
}

/// Per-store transaction bookkeeping.
pub(crate) struct TxnController {
    depths: Mutex<Depths>,
    timeout: Duration,
}

impl TxnController {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            depths: Mutex::new(Depths {
                pid: std::process::id(),
                by_thread: HashMap::new(),
            }),
            timeout,
        }
    }

    /// Locks the depth map, forgetting scopes entered by another process.
    fn depths(&self) -> MutexGuard<'_, Depths> {
        let mut depths = self.depths.lock();
        let pid = std::process::id();
        if depths.pid != pid {
            debug!(
                old_pid = depths.pid,
                new_pid = pid,
                "process changed, forgetting inherited scopes"
            );
            depths.by_thread.clear();
            depths.pid = pid;
        }
        depths
    }

    /// Returns true if the calling thread is inside a scope.
    pub(crate) fn in_transaction(&self) -> bool {
        self.depths().by_thread.contains_key(&thread::current().id())
    }

    /// Runs `f` inside a transaction on the calling thread's connection.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back if it
    /// returns `Err` or panics.
    pub(crate) fn run<T, E, F>(&self, shared: &SharedConnection, retry: bool, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    {
        let conn = shared.lock();
        let scope = self.enter(&conn, retry)?;
        let txn = Transaction::new(&conn);
        match f(&txn) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                scope.rollback();
                Err(err)
            }
        }
    }

    fn enter<'a>(&'a self, conn: &'a Connection, retry: bool) -> StoreResult<Scope<'a>> {
        let tid = thread::current().id();
        let outermost = {
            let mut depths = self.depths();
            let depth = depths.by_thread.entry(tid).or_insert(0);
            *depth += 1;
            *depth == 1
        };
        let scope = Scope {
            controller: self,
            conn,
            tid,
            outermost,
            finished: false,
        };
        if outermost {
            self.begin(conn, retry)?;
        }
        Ok(scope)
    }

    fn begin(&self, conn: &Connection, retry: bool) -> StoreResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0_u32;
        loop {
            match conn.execute_batch("BEGIN IMMEDIATE") {
                Ok(()) => {
                    trace!(attempts, "begin");
                    return Ok(());
                }
                Err(err) => {
                    let err = StoreError::from(err);
                    if !retry || !err.is_busy() || Instant::now() >= deadline {
                        return Err(err);
                    }
                    attempts += 1;
                    debug!(attempts, "database busy, retrying begin");
                    thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    fn leave(&self, tid: ThreadId) {
        let mut depths = self.depths();
        if let Some(depth) = depths.by_thread.get_mut(&tid) {
            *depth -= 1;
            if *depth == 0 {
                depths.by_thread.remove(&tid);
            }
        }
    }
}

/// One entered scope. Rolls back on drop unless finished.
struct Scope<'a> {
    controller: &'a TxnController,
    conn: &'a Connection,
    tid: ThreadId,
    outermost: bool,
    finished: bool,
}

impl Scope<'_> {
    fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        if !self.outermost {
            return Ok(());
        }
        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                trace!("commit");
                Ok(())
            }
            Err(err) => {
                self.finish_rollback();
                Err(err.into())
            }
        }
    }

    fn rollback(mut self) {
        self.finished = true;
        if self.outermost {
            self.finish_rollback();
        }
    }

    fn finish_rollback(&self) {
        if self.conn.is_autocommit() {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => trace!("rollback"),
            Err(err) => debug!(error = %err, "rollback failed"),
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.finished && self.outermost {
            self.finish_rollback();
        }
        self.controller.leave(self.tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::ReentrantMutex;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SharedConnection) {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("t.db")).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        (dir, Arc::new(ReentrantMutex::new(conn)))
    }

    fn count(shared: &SharedConnection) -> i64 {
        shared
            .lock()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn commit_on_ok() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        txn.run(&shared, false, |tx| {
            tx.execute("INSERT INTO t VALUES (?1)", &[Value::from(1)])?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
        assert_eq!(count(&shared), 1);
        assert!(!txn.in_transaction());
    }

    #[test]
    fn rollback_on_err() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        let result: StoreResult<()> = txn.run(&shared, false, |tx| {
            tx.execute("INSERT INTO t VALUES (?1)", &[Value::from(1)])?;
            Err(StoreError::invalid_value("abort"))
        });
        assert!(result.is_err());
        assert_eq!(count(&shared), 0);
        assert!(shared.lock().is_autocommit());
    }

    #[test]
    fn nested_scopes_share_outer_fate() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        let result: StoreResult<()> = txn.run(&shared, false, |tx| {
            tx.execute("INSERT INTO t VALUES (1)", &[])?;
            txn.run(&shared, false, |inner| {
                inner.execute("INSERT INTO t VALUES (2)", &[])?;
                Ok::<_, StoreError>(())
            })?;
            assert!(txn.in_transaction());
            assert!(!tx.connection().is_autocommit());
            Err(StoreError::invalid_value("abort"))
        });
        assert!(result.is_err());
        assert_eq!(count(&shared), 0);
    }

    #[test]
    fn panic_rolls_back() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: StoreResult<()> = txn.run(&shared, false, |tx| {
                tx.execute("INSERT INTO t VALUES (1)", &[])?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert!(!txn.in_transaction());
        assert_eq!(count(&shared), 0);
    }

    #[test]
    fn scopes_inherited_from_another_process_are_forgotten() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        {
            // as left behind by a parent that forked inside a scope
            let mut depths = txn.depths.lock();
            depths.pid = std::process::id().wrapping_add(1);
            depths.by_thread.insert(thread::current().id(), 1);
        }
        assert!(!txn.in_transaction());

        let result: StoreResult<()> = txn.run(&shared, false, |tx| {
            tx.execute("INSERT INTO t VALUES (1)", &[])?;
            assert!(!tx.connection().is_autocommit());
            Err(StoreError::invalid_value("abort"))
        });
        assert!(result.is_err());
        assert_eq!(count(&shared), 0);
        assert!(!txn.in_transaction());
    }

    #[test]
    fn query_helpers_return_values() {
        let (_dir, shared) = setup();
        let txn = TxnController::new(Duration::from_secs(1));
        let rows = txn
            .run(&shared, false, |tx| {
                tx.execute_batch("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);")?;
                tx.query("SELECT x FROM t ORDER BY x", &[])
            })
            .unwrap();
        assert_eq!(rows, vec![vec![Value::from(1)], vec![Value::from(2)]]);

        let none = txn
            .run(&shared, false, |tx| {
                tx.query_row("SELECT x FROM t WHERE x > ?1", &[Value::from(5)])
            })
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn busy_without_retry_fails_fast() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.db");
        let open = || {
            let conn = Connection::open(&path).unwrap();
            conn.busy_timeout(Duration::from_millis(1)).unwrap();
            Arc::new(ReentrantMutex::new(conn))
        };
        let holder = open();
        holder
            .lock()
            .execute_batch("CREATE TABLE t (x INTEGER); BEGIN IMMEDIATE;")
            .unwrap();

        let other = open();
        let txn = TxnController::new(Duration::from_millis(20));
        let err = txn
            .run(&other, false, |_| Ok::<_, StoreError>(()))
            .unwrap_err();
        assert!(err.is_busy());
        assert!(!txn.in_transaction());

        let err = txn
            .run(&other, true, |_| Ok::<_, StoreError>(()))
            .unwrap_err();
        assert!(err.is_busy());

        holder.lock().execute_batch("COMMIT").unwrap();
        txn.run(&other, true, |_| Ok::<_, StoreError>(())).unwrap();
    }
}
