//! Test fixtures and store helpers.
//!
//! Provides temporary stores that clean up after themselves.

use diskstore_core::{DiskStore, Record, StoreConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name used for fixture databases.
pub const TEST_DB_NAME: &str = "test.db";

/// A store in a temporary directory, removed on drop.
pub struct TestStore<R> {
    /// The store instance.
    pub store: DiskStore<R>,
    dir: TempDir,
}

impl<R: Record> TestStore<R> {
    /// Creates a store with default settings.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with the given settings.
    pub fn with_config(config: StoreConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = DiskStore::open_with_config(dir.path().join(TEST_DB_NAME), config)
            .expect("Failed to open test store");
        Self { store, dir }
    }

    /// Opens another store on the same file, for example with a
    /// different record type or table.
    pub fn reopen<S: Record>(&self, config: StoreConfig) -> DiskStore<S> {
        DiskStore::open_with_config(self.db_path(), config).expect("Failed to reopen test store")
    }

    /// Returns the database file path.
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join(TEST_DB_NAME)
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl<R: Record> Default for TestStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::ops::Deref for TestStore<R> {
    type Target = DiskStore<R>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Creates a temporary store with default settings.
pub fn temp_store<R: Record>() -> TestStore<R> {
    TestStore::new()
}

/// Creates a temporary store with the given settings.
pub fn temp_store_with_config<R: Record>(config: StoreConfig) -> TestStore<R> {
    TestStore::with_config(config)
}

/// Runs a test with a temporary store.
///
/// # Example
///
/// ```rust,ignore
/// use diskstore_core::Scalar;
/// use diskstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store::<Scalar, _, _>(|store| {
///         store.set("a", &Scalar::new(1)).unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<R, F, T>(f: F) -> T
where
    R: Record,
    F: FnOnce(&DiskStore<R>) -> T,
{
    let test_store = TestStore::<R>::new();
    f(&test_store.store)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use diskstore_core::Scalar;

    /// Creates a store holding keys `key-0 .. key-{count-1}` with their
    /// index as value, inserted in order.
    pub fn populated_store(count: usize) -> TestStore<Scalar> {
        let test_store = TestStore::new();
        let entries = (0..count).map(|i| {
            let n = i64::try_from(i).expect("count fits in i64");
            (format!("key-{i}"), Scalar::new(n))
        });
        test_store
            .store
            .update(entries)
            .expect("Failed to populate store");
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskstore_core::Scalar;

    #[test]
    fn test_temp_store_is_usable() {
        let store = temp_store::<Scalar>();
        store.set("a", &Scalar::new(1)).unwrap();
        assert!(store.db_path().exists());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_with_temp_store() {
        let len = with_temp_store::<Scalar, _, _>(|store| {
            store.set("a", &Scalar::new(1)).unwrap();
            store.len().unwrap()
        });
        assert_eq!(len, 1);
    }

    #[test]
    fn test_populated_scenario() {
        let store = scenarios::populated_store(10);
        assert_eq!(store.len().unwrap(), 10);
        assert_eq!(store.get("key-3").unwrap(), Scalar::new(3));
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let store = temp_store::<Scalar>();
        let dir = store.dir().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }
}
