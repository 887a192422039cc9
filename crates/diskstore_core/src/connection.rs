//! Per-thread, fork-aware connection management.
//!
//! Every (process, thread) pair gets its own engine connection to the
//! backing file. Connections are opened lazily on first use and carry the
//! configured engine options. When the process id changes (the store was
//! inherited across `fork`), every recorded connection is discarded
//! without running the engine's close path, since the handles are
//! duplicates of the parent's and must not touch its locks or journal.
//!
//! A thread's connections are closed when the thread exits: each thread
//! keeps a thread-local list of the pools it holds a connection in, and
//! dropping that list removes its entries.

use crate::error::{StoreError, StoreResult};
use crate::pragma::Pragmas;
use parking_lot::{Mutex, ReentrantMutex};
use rusqlite::{Connection, OpenFlags};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::debug;

/// A connection owned by one thread.
///
/// The mutex is reentrant so that nested operations of the owning thread,
/// for example a `set` inside a transaction scope, share the handle.
pub(crate) type SharedConnection = Arc<ReentrantMutex<Connection>>;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A file on disk.
    File(PathBuf),
    /// A named in-memory database shared by all connections of a process.
    Memory(String),
}

impl Location {
    /// Creates a new uniquely named in-memory location.
    pub fn memory() -> Self {
        Location::Memory(format!("diskstore-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the file path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Location::File(path) => Some(path),
            Location::Memory(_) => None,
        }
    }

    fn memory_uri(name: &str) -> String {
        format!("file:{name}?mode=memory&cache=shared")
    }
}

/// Access mode of the connections handed out by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only. Opening fails if the file does not exist.
    ReadOnly,
    /// Read-write. The file is created if missing.
    ReadWrite,
}

struct PoolState {
    pid: u32,
    connections: HashMap<ThreadId, SharedConnection>,
}

/// Pools the owning thread holds a connection in, with the pid it was
/// opened under.
struct ThreadConnections {
    tid: ThreadId,
    pools: Vec<(Weak<Mutex<PoolState>>, u32)>,
}

impl ThreadConnections {
    fn register(&mut self, pool: Weak<Mutex<PoolState>>, pid: u32) {
        self.pools.retain(|(known, _)| known.strong_count() > 0);
        if !self
            .pools
            .iter()
            .any(|(known, known_pid)| known.ptr_eq(&pool) && *known_pid == pid)
        {
            self.pools.push((pool, pid));
        }
    }

    /// Drops this thread's connections from every live pool, except those
    /// inherited from another process.
    fn release(&mut self, current_pid: u32) {
        for (pool, pid) in self.pools.drain(..) {
            let Some(pool) = pool.upgrade() else {
                continue;
            };
            let mut state = pool.lock();
            if pid == current_pid && state.pid == current_pid {
                state.connections.remove(&self.tid);
            }
        }
    }
}

impl Drop for ThreadConnections {
    fn drop(&mut self) {
        self.release(std::process::id());
    }
}

thread_local! {
    static THREAD_CONNECTIONS: RefCell<ThreadConnections> = RefCell::new(ThreadConnections {
        tid: thread::current().id(),
        pools: Vec::new(),
    });
}

/// Hands out one connection per (process, thread).
pub(crate) struct ConnectionManager {
    location: Location,
    mode: OpenMode,
    timeout: Duration,
    pragmas: Pragmas,
    state: Arc<Mutex<PoolState>>,
    // Keeps a named in-memory database alive while threads come and go.
    anchor: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        location: Location,
        mode: OpenMode,
        timeout: Duration,
        pragmas: Pragmas,
    ) -> StoreResult<Self> {
        let manager = Self {
            location,
            mode,
            timeout,
            pragmas,
            state: Arc::new(Mutex::new(PoolState {
                pid: std::process::id(),
                connections: HashMap::new(),
            })),
            anchor: Mutex::new(None),
        };
        if matches!(manager.location, Location::Memory(_)) {
            *manager.anchor.lock() = Some(manager.open()?);
        }
        Ok(manager)
    }

    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Returns the calling thread's connection, opening it if needed.
    pub(crate) fn connection(&self) -> StoreResult<SharedConnection> {
        self.connection_for_pid(std::process::id())
    }

    pub(crate) fn connection_for_pid(&self, pid: u32) -> StoreResult<SharedConnection> {
        let tid = thread::current().id();
        {
            let mut state = self.state.lock();
            if state.pid != pid {
                let stale = std::mem::take(&mut state.connections);
                debug!(
                    old_pid = state.pid,
                    new_pid = pid,
                    discarded = stale.len(),
                    "process changed, discarding inherited connections"
                );
                for (_, conn) in stale {
                    std::mem::forget(conn);
                }
                state.pid = pid;
            }
            if let Some(conn) = state.connections.get(&tid) {
                return Ok(Arc::clone(conn));
            }
        }

        // Opening may wait on engine locks; do it without holding the map.
        let conn: SharedConnection = Arc::new(ReentrantMutex::new(self.open()?));
        let conn = Arc::clone(self.state.lock().connections.entry(tid).or_insert(conn));
        self.register_thread(pid);
        Ok(conn)
    }

    fn register_thread(&self, pid: u32) {
        let pool = Arc::downgrade(&self.state);
        let registered = THREAD_CONNECTIONS.try_with(|local| local.borrow_mut().register(pool, pid));
        if registered.is_err() {
            debug!("thread is exiting, connection kept until close");
        }
    }

    /// Closes the calling thread's connection. Other threads are unaffected.
    pub(crate) fn close(&self) {
        let tid = thread::current().id();
        let removed = self.state.lock().connections.remove(&tid);
        if removed.is_some() {
            debug!(?tid, "closed connection");
        }
    }

    /// Number of live connections, across threads.
    #[cfg(test)]
    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    fn open(&self) -> StoreResult<Connection> {
        let flags = match self.mode {
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        } | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = match &self.location {
            Location::File(path) => {
                if self.mode == OpenMode::ReadOnly && !path.exists() {
                    return Err(StoreError::DatabaseNotFound { path: path.clone() });
                }
                if self.mode == OpenMode::ReadWrite {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open_with_flags(path, flags)?
            }
            Location::Memory(name) => {
                Connection::open_with_flags(Location::memory_uri(name), flags)?
            }
        };

        conn.busy_timeout(self.timeout)?;
        conn.set_prepared_statement_cache_capacity(32);
        self.pragmas
            .apply(&conn, self.mode == OpenMode::ReadOnly)?;

        debug!(location = ?self.location, mode = ?self.mode, "opened connection");
        Ok(conn)
    }
}
