//! Store configuration.

use crate::pragma::Pragmas;
use diskstore_codec::StorageType;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default lock timeout, also the deadline for retrying transactions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sleep between attempts of a retrying transaction.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Rows fetched per round trip by lazy iterators.
pub const DEFAULT_FETCH_SIZE: usize = 256;

/// Name of the primary key column.
pub const KEY_COLUMN: &str = "_key";

/// Declared type of the primary key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyType {
    /// Keys keep whatever storage class they were written with.
    #[default]
    Blob,
    /// `TEXT` affinity.
    Text,
    /// `INTEGER PRIMARY KEY`, an alias of the rowid. Keys may be omitted
    /// on insert and are then assigned by the engine.
    Integer,
    /// `REAL` affinity.
    Real,
}

impl KeyType {
    /// Returns the storage type used for the key column.
    #[must_use]
    pub const fn storage_type(self) -> StorageType {
        match self {
            KeyType::Blob => StorageType::Blob,
            KeyType::Text => StorageType::Text,
            KeyType::Integer => StorageType::Integer,
            KeyType::Real => StorageType::Real,
        }
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Table name. Defaults to the value schema name.
    pub table: Option<String>,

    /// Declared type of the key column.
    pub key_type: KeyType,

    /// Engine lock timeout and retry deadline.
    pub timeout: Duration,

    /// Whether to add missing value columns on open.
    pub alter_table: bool,

    /// Rows fetched per page by lazy iterators.
    pub fetch_size: usize,

    /// Engine options for every fresh connection.
    pub pragmas: Pragmas,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: None,
            key_type: KeyType::Blob,
            timeout: DEFAULT_TIMEOUT,
            alter_table: true,
            fetch_size: DEFAULT_FETCH_SIZE,
            pragmas: Pragmas::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Sets the key column type.
    #[must_use]
    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    /// Sets the lock timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether missing columns are added on open.
    #[must_use]
    pub fn alter_table(mut self, value: bool) -> Self {
        self.alter_table = value;
        self
    }

    /// Sets the iterator page size. Zero is treated as one.
    #[must_use]
    pub fn fetch_size(mut self, rows: usize) -> Self {
        self.fetch_size = rows.max(1);
        self
    }

    /// Replaces the engine options.
    #[must_use]
    pub fn pragmas(mut self, pragmas: Pragmas) -> Self {
        self.pragmas = pragmas;
        self
    }
}

/// Expands a leading `~` to the user's home directory.
pub(crate) fn expand_path(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
