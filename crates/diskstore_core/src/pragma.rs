//! Engine options applied to every fresh connection.

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-space reclaim policy (`PRAGMA auto_vacuum`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoVacuum {
    /// Never reclaim automatically.
    None,
    /// Reclaim on every commit.
    Full,
    /// Reclaim on `PRAGMA incremental_vacuum`.
    Incremental,
}

/// Rollback journal mode (`PRAGMA journal_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Delete the journal at the end of each transaction.
    Delete,
    /// Truncate the journal instead of deleting it.
    Truncate,
    /// Keep the journal and zero its header.
    Persist,
    /// Keep the journal in memory.
    Memory,
    /// Write-ahead log.
    Wal,
    /// No journal.
    Off,
}

/// fsync aggressiveness (`PRAGMA synchronous`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    /// Hand writes to the OS without syncing.
    Off,
    /// Sync at critical moments.
    Normal,
    /// Sync on every commit.
    Full,
    /// Full, plus syncing the directory after unlinking a journal.
    Extra,
}

/// Placement of temporary tables and indices (`PRAGMA temp_store`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempStore {
    /// Compile-time default.
    Default,
    /// Temporary files.
    File,
    /// Memory.
    Memory,
}

macro_rules! keyword_display {
    ($ty:ty { $($variant:ident => $kw:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $kw),+
                })
            }
        }
    };
}

keyword_display!(AutoVacuum { None => "NONE", Full => "FULL", Incremental => "INCREMENTAL" });
keyword_display!(JournalMode {
    Delete => "DELETE",
    Truncate => "TRUNCATE",
    Persist => "PERSIST",
    Memory => "MEMORY",
    Wal => "WAL",
    Off => "OFF",
});
keyword_display!(Synchronous { Off => "OFF", Normal => "NORMAL", Full => "FULL", Extra => "EXTRA" });
keyword_display!(TempStore { Default => "DEFAULT", File => "FILE", Memory => "MEMORY" });

/// Engine configuration applied to each new connection.
///
/// Some pragmas are per-connection, so they are applied on every fresh
/// connection rather than once per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pragmas {
    /// Free-space reclaim policy.
    pub auto_vacuum: AutoVacuum,
    /// Page cache budget, in pages.
    pub cache_size: i64,
    /// Journal mode.
    pub journal_mode: JournalMode,
    /// Memory-mapped I/O budget, in bytes.
    pub mmap_size: i64,
    /// fsync aggressiveness.
    pub synchronous: Synchronous,
    /// Temp-data placement.
    pub temp_store: TempStore,
    /// Additional pragmas, applied after the recognized ones in key order.
    pub extra: BTreeMap<String, String>,
}

impl Default for Pragmas {
    fn default() -> Self {
        Self {
            auto_vacuum: AutoVacuum::None,
            cache_size: 1 << 13,
            journal_mode: JournalMode::Wal,
            mmap_size: 1 << 28,
            synchronous: Synchronous::Normal,
            temp_store: TempStore::Memory,
            extra: BTreeMap::new(),
        }
    }
}

impl Pragmas {
    /// Creates the default pragma set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the auto-vacuum mode.
    #[must_use]
    pub fn auto_vacuum(mut self, value: AutoVacuum) -> Self {
        self.auto_vacuum = value;
        self
    }

    /// Sets the page cache budget.
    #[must_use]
    pub fn cache_size(mut self, pages: i64) -> Self {
        self.cache_size = pages;
        self
    }

    /// Sets the journal mode.
    #[must_use]
    pub fn journal_mode(mut self, value: JournalMode) -> Self {
        self.journal_mode = value;
        self
    }

    /// Sets the memory-map budget.
    #[must_use]
    pub fn mmap_size(mut self, bytes: i64) -> Self {
        self.mmap_size = bytes;
        self
    }

    /// Sets the synchronous level.
    #[must_use]
    pub fn synchronous(mut self, value: Synchronous) -> Self {
        self.synchronous = value;
        self
    }

    /// Sets the temp store placement.
    #[must_use]
    pub fn temp_store(mut self, value: TempStore) -> Self {
        self.temp_store = value;
        self
    }

    /// Adds an arbitrary pragma.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Returns `(name, rendered value)` pairs in application order.
    ///
    /// With `connection_local` set only the options that can be changed
    /// on a read-only connection are returned.
    pub(crate) fn entries(&self, connection_local: bool) -> Vec<(String, String)> {
        let mut entries = Vec::with_capacity(6 + self.extra.len());
        if !connection_local {
            entries.push(("auto_vacuum".to_string(), self.auto_vacuum.to_string()));
        }
        entries.push(("cache_size".to_string(), self.cache_size.to_string()));
        if !connection_local {
            entries.push(("journal_mode".to_string(), self.journal_mode.to_string()));
        }
        entries.push(("mmap_size".to_string(), self.mmap_size.to_string()));
        if !connection_local {
            entries.push(("synchronous".to_string(), self.synchronous.to_string()));
        }
        entries.push(("temp_store".to_string(), self.temp_store.to_string()));
        if !connection_local {
            for (name, value) in &self.extra {
                entries.push((name.clone(), render_value(value)));
            }
        }
        entries
    }

    /// Applies the pragmas to a connection.
    pub(crate) fn apply(&self, conn: &Connection, connection_local: bool) -> StoreResult<()> {
        for (name, value) in self.entries(connection_local) {
            run_pragma(conn, &name, &value)?;
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_value(value: &str) -> String {
    if value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok() || is_identifier(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Executes `PRAGMA name = value`, discarding any rows it returns.
pub(crate) fn run_pragma(conn: &Connection, name: &str, value: &str) -> StoreResult<()> {
    if !is_identifier(name) {
        return Err(StoreError::invalid_value(format!(
            "invalid pragma name: {name:?}"
        )));
    }
    let mut stmt = conn.prepare(&format!("PRAGMA {name} = {value}"))?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}
