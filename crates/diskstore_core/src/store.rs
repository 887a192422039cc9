//! Read-write store.
//!
//! [`DiskStore`] owns the table: it creates it, adds missing columns on
//! open, and routes every write through precompiled statements. Single
//! writes outside a [`transact`](DiskStore::transact) scope run in their
//! own implicit transaction; inside a scope they join the scope's.

use crate::config::{expand_path, KeyType, StoreConfig};
use crate::connection::{Location, OpenMode};
use crate::error::{StoreError, StoreResult};
use crate::read::{decode_item, row_values, DiskRead, Inner};
use crate::record::Record;
use crate::schema::quote_ident;
use crate::statements::Statement;
use crate::transaction::Transaction;
use diskstore_codec::Value;
use rusqlite::params_from_iter;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use tracing::{debug, warn};

/// Persistent mapping from keys to records of type `R`.
///
/// Read operations come from [`DiskRead`] through `Deref`; they use the
/// store's read-write connections, so inside a transaction scope they see
/// the scope's uncommitted writes.
///
/// ```no_run
/// use diskstore_core::{DiskStore, StoreResult, Value};
///
/// fn main() -> StoreResult<()> {
///     let store: DiskStore<(i64,)> = DiskStore::open("t.db")?;
///     store.set("a", &(1,))?;
///     store.set("b", &(2,))?;
///     assert_eq!(store.add(Some("a"), &(9,))?, None);
///     assert_eq!(store.get("a")?, (1,));
///     assert_eq!(store.popitem()?, (Value::from("b"), (2,)));
///     assert_eq!(store.len()?, 1);
///     Ok(())
/// }
/// ```
pub struct DiskStore<R> {
    reader: DiskRead<R>,
}

impl<R> Clone for DiskStore<R> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<R> fmt::Debug for DiskStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DiskStore").field(&self.reader).finish()
    }
}

impl<R> Deref for DiskStore<R> {
    type Target = DiskRead<R>;

    fn deref(&self) -> &DiskRead<R> {
        &self.reader
    }
}

impl<R: Record> DiskStore<R> {
    /// Opens or creates a store with default settings.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens or creates a store.
    ///
    /// Missing parent directories and the file itself are created. The
    /// table is created if absent and, unless disabled in `config`, missing
    /// value columns are added.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        Self::with_location(Location::File(expand_path(path.as_ref())), config)
    }

    /// Creates an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with_config(StoreConfig::default())
    }

    /// Creates an ephemeral in-memory store with custom settings.
    pub fn open_in_memory_with_config(config: StoreConfig) -> StoreResult<Self> {
        Self::with_location(Location::memory(), config)
    }

    fn with_location(location: Location, config: StoreConfig) -> StoreResult<Self> {
        let alter_table = config.alter_table;
        let store = Self {
            reader: DiskRead::from_inner(Inner::new::<R>(location, OpenMode::ReadWrite, config)?),
        };

        {
            let shared = store.inner().connection()?;
            let conn = shared.lock();
            conn.execute_batch(store.inner().sql(Statement::Create))?;
        }
        if alter_table {
            store.migrate_schema()?;
        }
        Ok(store)
    }

    fn inner(&self) -> &Inner {
        &self.reader.inner
    }

    fn row(&self, key: Value, value: &R) -> StoreResult<Vec<Value>> {
        let values = value.to_values();
        self.inner().schema.validate(&values)?;
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(key);
        row.extend(values);
        Ok(row)
    }

    /// Inserts or overwrites the record under `key`.
    pub fn set(&self, key: impl Into<Value>, value: &R) -> StoreResult<()> {
        let row = self.row(key.into(), value)?;
        let shared = self.inner().connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner().sql(Statement::Set))?;
        stmt.execute(params_from_iter(row))?;
        Ok(())
    }

    /// Inserts `value` only if `key` is absent.
    ///
    /// Returns the key on insert, `None` if the key already existed. With
    /// `key` omitted the engine assigns the next integer key, which needs a
    /// store opened with [`KeyType::Integer`].
    pub fn add<K: Into<Value>>(&self, key: Option<K>, value: &R) -> StoreResult<Option<Value>> {
        let key = key.map(Into::into);
        if key.is_none() && self.key_type() != KeyType::Integer {
            return Err(StoreError::invalid_value(
                "omitting the key requires an integer key column",
            ));
        }
        let values = value.to_values();
        self.inner().schema.validate(&values)?;

        let params = std::iter::once(key).chain(values.into_iter().map(Some));
        let shared = self.inner().connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner().sql(Statement::Add))?;
        let mut rows = stmt.query(params_from_iter(params))?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if the key is absent.
    pub fn delete(&self, key: impl Into<Value>) -> StoreResult<()> {
        let key = key.into();
        let shared = self.inner().connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner().sql(Statement::Delete))?;
        if stmt.execute(params_from_iter([&key]))? == 0 {
            return Err(StoreError::KeyNotFound { key });
        }
        Ok(())
    }

    /// Removes `key` and returns its record, or `default` if absent.
    ///
    /// Runs in one retrying transaction.
    pub fn pop(&self, key: impl Into<Value>, default: Option<R>) -> StoreResult<R> {
        let key = key.into();
        self.transact(true, |txn| {
            let conn = txn.connection();
            let found = {
                let mut stmt = conn.prepare_cached(self.inner().sql(Statement::Get))?;
                let width = stmt.column_count();
                let mut rows = stmt.query(params_from_iter([&key]))?;
                match rows.next()? {
                    Some(row) => Some(row_values(row, 0, width)?),
                    None => None,
                }
            };
            match found {
                Some(values) => {
                    conn.prepare_cached(self.inner().sql(Statement::Delete))?
                        .execute(params_from_iter([&key]))?;
                    R::from_values(values)
                }
                None => default.ok_or_else(|| StoreError::KeyNotFound { key: key.clone() }),
            }
        })
    }

    /// Removes and returns the most recently inserted entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Empty`] if the store holds no entries.
    pub fn popitem(&self) -> StoreResult<(Value, R)> {
        self.transact(true, |txn| {
            let conn = txn.connection();
            let values = {
                let mut stmt = conn.prepare_cached(self.inner().sql(Statement::PopLast))?;
                let width = stmt.column_count();
                let mut rows = stmt.query([])?;
                match rows.next()? {
                    Some(row) => row_values(row, 0, width)?,
                    None => return Err(StoreError::Empty),
                }
            };
            let (key, value) = decode_item::<R>(values)?;
            conn.prepare_cached(self.inner().sql(Statement::Delete))?
                .execute(params_from_iter([&key]))?;
            Ok((key, value))
        })
    }

    /// Returns the record under `key`, inserting `default` if absent.
    ///
    /// Returns `None` only when the key is absent and no default is given.
    pub fn setdefault(&self, key: impl Into<Value>, default: Option<R>) -> StoreResult<Option<R>> {
        let key = key.into();
        if let Some(existing) = self.get_optional(&key)? {
            return Ok(Some(existing));
        }
        match default {
            Some(value) => match self.add(Some(key.clone()), &value)? {
                Some(_) => Ok(Some(value)),
                // another writer got there first
                None => self.get_optional(key),
            },
            None => Ok(None),
        }
    }

    /// Writes every `(key, value)` pair in one retrying transaction.
    ///
    /// Accepts maps, vectors of pairs and any other iterator of pairs. If
    /// any value is invalid nothing is written.
    pub fn update<I, K, V>(&self, source: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Borrow<R>,
    {
        self.transact(true, |txn| {
            let mut stmt = txn
                .connection()
                .prepare_cached(self.inner().sql(Statement::Set))?;
            for (key, value) in source {
                let row = self.row(key.into(), value.borrow())?;
                stmt.execute(params_from_iter(row))?;
            }
            Ok(())
        })
    }

    /// Copies every entry of `other` into this store in one transaction.
    pub fn update_from(&self, other: &DiskRead<R>) -> StoreResult<()> {
        self.transact(true, |txn| {
            let mut stmt = txn
                .connection()
                .prepare_cached(self.inner().sql(Statement::Set))?;
            for item in other.items() {
                let (key, value) = item?;
                stmt.execute(params_from_iter(self.row(key, &value)?))?;
            }
            Ok(())
        })
    }

    /// Deletes every entry and reclaims the freed space.
    ///
    /// The engine cannot vacuum inside a transaction, so this fails when
    /// called from a [`transact`](Self::transact) scope.
    pub fn clear(&self) -> StoreResult<()> {
        let shared = self.inner().connection()?;
        let conn = shared.lock();
        conn.execute_batch(self.inner().sql(Statement::Clear))?;
        Ok(())
    }

    /// Runs the engine's integrity check and returns its complaints.
    ///
    /// An empty list means the database is sound. With `vacuum` set the
    /// file is compacted afterwards regardless of the outcome.
    pub fn check(&self, vacuum: bool) -> StoreResult<Vec<String>> {
        let shared = self.inner().connection()?;
        let conn = shared.lock();
        let messages = {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let warnings = if messages.len() == 1 && messages[0] == "ok" {
            Vec::new()
        } else {
            for message in &messages {
                warn!(table = %self.table(), %message, "integrity check");
            }
            messages
        };

        if vacuum {
            conn.execute_batch("VACUUM")?;
        }
        Ok(warnings)
    }

    /// Adds value columns missing from the existing table.
    ///
    /// Columns are only ever added, each with its field's default, so rows
    /// written under an older value shape stay readable. Returns the names
    /// of the added columns.
    pub fn migrate_schema(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner();
        self.transact(true, |txn| {
            let existing: HashSet<String> = {
                let mut stmt = txn.connection().prepare(inner.sql(Statement::TableInfo))?;
                let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
                names.collect::<Result<_, _>>()?
            };

            let mut added = Vec::new();
            for (column, storage) in inner.schema.columns().iter().zip(inner.schema.column_types()) {
                if existing.contains(column) {
                    continue;
                }
                let default = inner
                    .schema
                    .default_for(column)
                    .cloned()
                    .unwrap_or_else(|| Value::zero(*storage));
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {} NOT NULL DEFAULT {}",
                    quote_ident(&inner.table),
                    quote_ident(column),
                    storage.as_sql(),
                    default.to_sql_literal()?,
                );
                txn.execute_batch(&sql)?;
                debug!(table = %inner.table, %column, %default, "added column");
                added.push(column.clone());
            }
            Ok(added)
        })
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
    /// panics. Scopes nest: a scope opened while the calling thread is
    /// already inside one joins it. With `retry` set, a busy database is
    /// polled until the store timeout elapses instead of failing at once.
    ///
    /// ```no_run
    /// # use diskstore_core::{DiskStore, Scalar, StoreError};
    /// # fn main() -> Result<(), StoreError> {
    /// let store: DiskStore<Scalar> = DiskStore::open("t.db")?;
    /// store.transact(true, |_txn| {
    ///     store.set("a", &Scalar::new(1))?;
    ///     store.set("b", &Scalar::new(2))?;
    ///     Ok::<_, StoreError>(())
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn transact<T, E, F>(&self, retry: bool, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    {
        let shared = self.inner().connection()?;
        self.inner().txn.run(&shared, retry, f)
    }

    /// Returns true if the calling thread is inside a transaction scope.
    pub fn in_transaction(&self) -> bool {
        self.inner().txn.in_transaction()
    }

    /// Opens a read-only view of the same table.
    ///
    /// The view has its own connections and sees committed data only.
    pub fn readonly_view(&self) -> StoreResult<DiskRead<R>> {
        let inner = self.inner();
        let config = inner.config.clone().table(inner.table.clone());
        let location = inner.connections.location().clone();
        let view = DiskRead::from_inner(Inner::new::<R>(location, OpenMode::ReadOnly, config)?);
        view.inner.connection()?;
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> DiskStore<Scalar> {
        DiskStore::open(dir.path().join("store.db")).unwrap()
    }

    #[test]
    fn set_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.set("a", &Scalar::new(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Scalar::new(1));
        assert!(store.contains("a").unwrap());

        store.delete("a").unwrap();
        assert!(!store.contains("a").unwrap());
        assert!(store.delete("a").unwrap_err().is_key_error());
    }

    #[test]
    fn add_reports_existing_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.add(Some(1), &Scalar::new(1)).unwrap(), Some(Value::from(1)));
        assert_eq!(store.add(Some(1), &Scalar::new(2)).unwrap(), None);
        assert_eq!(store.get(1).unwrap(), Scalar::new(1));
    }

    #[test]
    fn add_without_key_needs_integer_keys() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).add(None::<i64>, &Scalar::new(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));

        let ints: DiskStore<Scalar> = DiskStore::open_with_config(
            dir.path().join("ints.db"),
            StoreConfig::new().key_type(KeyType::Integer),
        )
        .unwrap();
        assert_eq!(ints.add(None::<i64>, &Scalar::new(0)).unwrap(), Some(Value::from(1)));
        assert_eq!(ints.add(None::<i64>, &Scalar::new(0)).unwrap(), Some(Value::from(2)));
    }

    #[test]
    fn pop_and_popitem() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set("a", &Scalar::new(1)).unwrap();
        store.set("b", &Scalar::new(2)).unwrap();

        assert_eq!(store.pop("a", None).unwrap(), Scalar::new(1));
        assert!(store.pop("a", None).unwrap_err().is_key_error());
        assert_eq!(store.pop("a", Some(Scalar::new(7))).unwrap(), Scalar::new(7));

        assert_eq!(store.popitem().unwrap(), (Value::from("b"), Scalar::new(2)));
        assert!(matches!(store.popitem().unwrap_err(), StoreError::Empty));
    }

    #[test]
    fn setdefault_inserts_once() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.setdefault("k", None).unwrap(), None);
        assert!(!store.contains("k").unwrap());
        assert_eq!(
            store.setdefault("k", Some(Scalar::new(1))).unwrap(),
            Some(Scalar::new(1))
        );
        assert_eq!(
            store.setdefault("k", Some(Scalar::new(2))).unwrap(),
            Some(Scalar::new(1))
        );
    }

    /// Writes its number, or a text value the INTEGER field rejects.
    #[derive(Debug, PartialEq)]
    struct Count(Option<i64>);

    impl Record for Count {
        fn schema() -> crate::ValueSchema {
            crate::ValueSchema::new("Count").field("n", diskstore_codec::StorageType::Integer)
        }

        fn to_values(&self) -> Vec<Value> {
            match self.0 {
                Some(n) => vec![Value::from(n)],
                None => vec![Value::from("not a number")],
            }
        }

        fn from_values(values: Vec<Value>) -> StoreResult<Self> {
            let n = values.first().and_then(Value::as_integer);
            Ok(Count(n))
        }
    }

    #[test]
    fn update_accepts_pairs_and_maps() {
        let dir = TempDir::new().unwrap();
        let store: DiskStore<(i64,)> = DiskStore::open(dir.path().join("typed.db")).unwrap();

        store.update(vec![("a", (1,)), ("b", (2,))]).unwrap();
        let map: std::collections::BTreeMap<&str, (i64,)> = [("c", (3,)), ("a", (10,))].into();
        store.update(map).unwrap();

        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.get("a").unwrap(), (10,));
    }

    #[test]
    fn update_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let store: DiskStore<Count> = DiskStore::open(dir.path().join("count.db")).unwrap();

        let err = store
            .update([("a", Count(Some(1))), ("b", Count(None)), ("c", Count(Some(3)))])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
        assert!(store.is_empty().unwrap());
        assert!(store.set("b", &Count(None)).is_err());
    }

    #[test]
    fn clear_empties_table() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.update((0..20).map(|i| (i, Scalar::new(i)))).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn clear_inside_scope_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store.transact(false, |_| store.clear());
        assert!(result.is_err());
        assert!(!store.in_transaction());
    }

    #[test]
    fn check_reports_sound_database() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set("a", &Scalar::new(1)).unwrap();
        assert!(store.check(false).unwrap().is_empty());
        assert!(store.check(true).unwrap().is_empty());
    }

    #[test]
    fn in_memory_store() {
        let store: DiskStore<Scalar> = DiskStore::open_in_memory().unwrap();
        store.set("a", &Scalar::new("x")).unwrap();
        assert_eq!(store.get("a").unwrap(), Scalar::new("x"));
        assert!(store.path().is_none());
    }

    #[test]
    fn readonly_view_sees_committed_data() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set("a", &Scalar::new(1)).unwrap();

        let view = store.readonly_view().unwrap();
        assert_eq!(view.get("a").unwrap(), Scalar::new(1));
        assert_eq!(view.table(), store.table());
    }
}
