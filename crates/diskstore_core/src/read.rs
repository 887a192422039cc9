//! Read-only mapping over a store table.
//!
//! [`DiskRead`] exposes lookups, counting, lazy iteration and raw filtered
//! queries. Iterators are paged: each page is fetched with a short-lived
//! statement, so no engine read lock is held between pages and concurrent
//! committed writes may become visible during consumption.

use crate::config::{expand_path, KeyType, StoreConfig};
use crate::connection::{ConnectionManager, Location, OpenMode, SharedConnection};
use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use crate::schema::DerivedSchema;
use crate::statements::{Statement, Statements};
use crate::transaction::TxnController;
use diskstore_codec::Value;
use rusqlite::{params_from_iter, Row};
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every handle of one store instance.
pub(crate) struct Inner {
    pub(crate) connections: ConnectionManager,
    pub(crate) statements: Statements,
    pub(crate) txn: TxnController,
    pub(crate) schema: DerivedSchema,
    pub(crate) table: String,
    pub(crate) config: StoreConfig,
}

impl Inner {
    pub(crate) fn new<R: Record>(
        location: Location,
        mode: OpenMode,
        mut config: StoreConfig,
    ) -> StoreResult<Self> {
        // a zero page would never report exhaustion
        config.fetch_size = config.fetch_size.max(1);
        let schema = R::schema().derive()?;
        let table = config
            .table
            .clone()
            .unwrap_or_else(|| schema.name().to_string());
        if table.is_empty() {
            return Err(StoreError::schema("table name must not be empty"));
        }
        Ok(Self {
            connections: ConnectionManager::new(
                location,
                mode,
                config.timeout,
                config.pragmas.clone(),
            )?,
            statements: Statements::build(&table, config.key_type, &schema),
            txn: TxnController::new(config.timeout),
            schema,
            table,
            config,
        })
    }

    pub(crate) fn connection(&self) -> StoreResult<SharedConnection> {
        self.connections.connection()
    }

    pub(crate) fn sql(&self, statement: Statement) -> &str {
        self.statements.sql(statement)
    }
}

/// Collects the columns of `row` from index `from` on.
pub(crate) fn row_values(row: &Row<'_>, from: usize, width: usize) -> rusqlite::Result<Vec<Value>> {
    (from..width).map(|i| row.get(i)).collect()
}

/// Splits a `(key, columns...)` row into the key and its record.
pub(crate) fn decode_item<R: Record>(values: Vec<Value>) -> StoreResult<(Value, R)> {
    let mut values = values.into_iter();
    let key = values
        .next()
        .ok_or_else(|| StoreError::invalid_value("row has no key column"))?;
    Ok((key, R::from_values(values.collect())?))
}

fn decode_key(values: Vec<Value>) -> StoreResult<Value> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::invalid_value("row has no key column"))
}

fn decode_value<R: Record>(values: Vec<Value>) -> StoreResult<R> {
    decode_item::<R>(values).map(|(_, value)| value)
}

/// Read-only mapping from keys to records of type `R`.
///
/// Cloning is cheap; clones share connections and statements.
pub struct DiskRead<R> {
    pub(crate) inner: Arc<Inner>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for DiskRead<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for DiskRead<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskRead")
            .field("location", self.inner.connections.location())
            .field("table", &self.inner.table)
            .field("mode", &self.inner.connections.mode())
            .finish()
    }
}

impl<R: Record> DiskRead<R> {
    /// Opens an existing database file read-only with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseNotFound`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens an existing database file read-only.
    ///
    /// Only the table, timeout, fetch size and connection-local engine
    /// options of `config` are used. The table is never created.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let location = Location::File(expand_path(path.as_ref()));
        let reader = Self::from_inner(Inner::new::<R>(location, OpenMode::ReadOnly, config)?);
        reader.inner.connection()?;
        Ok(reader)
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
            _record: PhantomData,
        }
    }

    /// Returns the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if the key is absent.
    pub fn get(&self, key: impl Into<Value>) -> StoreResult<R> {
        let key = key.into();
        match self.get_optional(&key)? {
            Some(value) => Ok(value),
            None => Err(StoreError::KeyNotFound { key }),
        }
    }

    /// Returns the record stored under `key`, if any.
    pub fn get_optional(&self, key: impl Into<Value>) -> StoreResult<Option<R>> {
        let key = key.into();
        let shared = self.inner.connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner.sql(Statement::Get))?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter([key]))?;
        match rows.next()? {
            Some(row) => Ok(Some(R::from_values(row_values(row, 0, width)?)?)),
            None => Ok(None),
        }
    }

    /// Returns the record stored under `key`, or `default`.
    pub fn get_or(&self, key: impl Into<Value>, default: R) -> StoreResult<R> {
        Ok(self.get_optional(key)?.unwrap_or(default))
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: impl Into<Value>) -> StoreResult<bool> {
        let shared = self.inner.connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner.sql(Statement::Contains))?;
        Ok(stmt.exists(params_from_iter([key.into()]))?)
    }

    /// Returns the exact number of entries.
    pub fn len(&self) -> StoreResult<usize> {
        let shared = self.inner.connection()?;
        let conn = shared.lock();
        let mut stmt = conn.prepare_cached(self.inner.sql(Statement::Count))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Keys in insertion order.
    pub fn iter(&self) -> RowIter<Value> {
        RowIter::keyset(&self.inner, Statement::Iter, false, decode_key)
    }

    /// Keys in reverse insertion order.
    pub fn iter_rev(&self) -> RowIter<Value> {
        RowIter::keyset(&self.inner, Statement::Reversed, true, decode_key)
    }

    /// View over the keys.
    pub fn keys(&self) -> Keys<'_, R> {
        Keys { store: self }
    }

    /// View over the values.
    pub fn values(&self) -> Values<'_, R> {
        Values { store: self }
    }

    /// View over `(key, value)` pairs.
    pub fn items(&self) -> Items<'_, R> {
        Items { store: self }
    }

    /// Lazily selects `(key, value)` pairs with raw SQL fragments.
    ///
    /// `filter` is appended after `WHERE` and `order` after `ORDER BY`,
    /// verbatim. Literals belong in `params`, bound positionally.
    ///
    /// Without `order`, rows come in insertion order and are paged by rowid,
    /// so deleting yielded rows while iterating skips nothing. With `order`,
    /// pages are taken by `LIMIT ? OFFSET ?`; rows deleted or inserted
    /// during iteration then shift the remaining pages.
    ///
    /// ```no_run
    /// # use diskstore_core::{DiskStore, Scalar, Value};
    /// # fn main() -> diskstore_core::StoreResult<()> {
    /// let store: DiskStore<Scalar> = DiskStore::open("data.db")?;
    /// let big = store
    ///     .query(Some("value > ?"), &[Value::from(100)], Some("value DESC"))
    ///     .collect::<Result<Vec<_>, _>>()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn query(
        &self,
        filter: Option<&str>,
        params: &[Value],
        order: Option<&str>,
    ) -> RowIter<(Value, R)> {
        let mut sql = self.inner.sql(Statement::Query).to_string();
        let filter = filter.filter(|f| !f.trim().is_empty());
        let source = match order.filter(|o| !o.trim().is_empty()) {
            None => {
                sql.push_str(" WHERE ");
                if let Some(filter) = filter {
                    sql.push('(');
                    sql.push_str(filter);
                    sql.push_str(") AND ");
                }
                sql.push_str("rowid > ? ORDER BY rowid ASC LIMIT ?");
                Source::Keyset {
                    sql,
                    params: params.to_vec(),
                    after: Value::Real(f64::NEG_INFINITY),
                }
            }
            Some(order) => {
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(filter);
                }
                sql.push_str(" ORDER BY ");
                sql.push_str(order);
                sql.push_str(" LIMIT ? OFFSET ?");
                Source::Offset {
                    sql,
                    params: params.to_vec(),
                    offset: 0,
                }
            }
        };
        RowIter::new(&self.inner, source, decode_item::<R>)
    }

    /// Closes the calling thread's connection. It reopens on next use.
    pub fn close(&self) {
        self.inner.connections.close();
    }

    /// Returns the database file path, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.inner.connections.location().path()
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// Returns the lock timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout
    }

    /// Returns the derived column metadata.
    pub fn schema(&self) -> &DerivedSchema {
        &self.inner.schema
    }

    /// Returns the declared key column type.
    pub fn key_type(&self) -> KeyType {
        self.inner.config.key_type
    }
}

/// Keys view of a store. See [`DiskRead::keys`].
pub struct Keys<'a, R> {
    store: &'a DiskRead<R>,
}

impl<R: Record> Keys<'_, R> {
    /// Keys in insertion order.
    pub fn iter(&self) -> RowIter<Value> {
        self.store.iter()
    }

    /// Keys in reverse insertion order.
    pub fn iter_rev(&self) -> RowIter<Value> {
        self.store.iter_rev()
    }
}

impl<R: Record> IntoIterator for Keys<'_, R> {
    type Item = StoreResult<Value>;
    type IntoIter = RowIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Values view of a store. See [`DiskRead::values`].
pub struct Values<'a, R> {
    store: &'a DiskRead<R>,
}

impl<R: Record> Values<'_, R> {
    /// Values in insertion order.
    pub fn iter(&self) -> RowIter<R> {
        RowIter::keyset(&self.store.inner, Statement::Items, false, decode_value::<R>)
    }

    /// Values in reverse insertion order.
    pub fn iter_rev(&self) -> RowIter<R> {
        RowIter::keyset(
            &self.store.inner,
            Statement::ItemsReversed,
            true,
            decode_value::<R>,
        )
    }
}

impl<R: Record> IntoIterator for Values<'_, R> {
    type Item = StoreResult<R>;
    type IntoIter = RowIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Items view of a store. See [`DiskRead::items`].
pub struct Items<'a, R> {
    store: &'a DiskRead<R>,
}

impl<R: Record> Items<'_, R> {
    /// Pairs in insertion order.
    pub fn iter(&self) -> RowIter<(Value, R)> {
        RowIter::keyset(&self.store.inner, Statement::Items, false, decode_item::<R>)
    }

    /// Pairs in reverse insertion order.
    pub fn iter_rev(&self) -> RowIter<(Value, R)> {
        RowIter::keyset(
            &self.store.inner,
            Statement::ItemsReversed,
            true,
            decode_item::<R>,
        )
    }
}

impl<R: Record> IntoIterator for Items<'_, R> {
    type Item = StoreResult<(Value, R)>;
    type IntoIter = RowIter<(Value, R)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Both sources select `rowid` as their first column.
enum Source {
    /// Pages by rowid; `after` is the last rowid seen and is bound after
    /// `params`, followed by the page size. The first page binds an
    /// infinite REAL so that every rowid qualifies.
    Keyset {
        sql: String,
        params: Vec<Value>,
        after: Value,
    },
    /// Pages by `LIMIT ? OFFSET ?` appended to caller SQL.
    Offset {
        sql: String,
        params: Vec<Value>,
        offset: i64,
    },
}

/// Lazy, one-pass, paged iterator over table rows.
///
/// Yields an error at most once, then stops.
pub struct RowIter<T> {
    inner: Arc<Inner>,
    source: Source,
    decode: fn(Vec<Value>) -> StoreResult<T>,
    buffer: VecDeque<Vec<Value>>,
    exhausted: bool,
}

impl<T> RowIter<T> {
    fn new(inner: &Arc<Inner>, source: Source, decode: fn(Vec<Value>) -> StoreResult<T>) -> Self {
        Self {
            inner: Arc::clone(inner),
            source,
            decode,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn keyset(
        inner: &Arc<Inner>,
        statement: Statement,
        reverse: bool,
        decode: fn(Vec<Value>) -> StoreResult<T>,
    ) -> Self {
        let start = if reverse {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        Self::new(
            inner,
            Source::Keyset {
                sql: inner.sql(statement).to_string(),
                params: Vec::new(),
                after: Value::Real(start),
            },
            decode,
        )
    }

    fn fetch(&mut self) -> StoreResult<()> {
        let limit = i64::try_from(self.inner.config.fetch_size).unwrap_or(i64::MAX);
        let shared = self.inner.connection()?;
        let conn = shared.lock();
        let mut fetched = 0_i64;

        match &mut self.source {
            Source::Keyset { sql, params, after } => {
                let mut stmt = conn.prepare_cached(sql)?;
                let width = stmt.column_count();
                let bound = params
                    .iter()
                    .cloned()
                    .chain([after.clone(), Value::Integer(limit)]);
                let mut rows = stmt.query(params_from_iter(bound))?;
                while let Some(row) = rows.next()? {
                    let rowid: i64 = row.get(0)?;
                    self.buffer.push_back(row_values(row, 1, width)?);
                    *after = Value::Integer(rowid);
                    fetched += 1;
                }
            }
            Source::Offset {
                sql,
                params,
                offset,
            } => {
                let mut stmt = conn.prepare_cached(sql)?;
                let width = stmt.column_count();
                let bound = params
                    .iter()
                    .cloned()
                    .chain([Value::Integer(limit), Value::Integer(*offset)]);
                let mut rows = stmt.query(params_from_iter(bound))?;
                while let Some(row) = rows.next()? {
                    self.buffer.push_back(row_values(row, 1, width)?);
                    fetched += 1;
                }
                *offset += fetched;
            }
        }

        if fetched < limit {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl<T> Iterator for RowIter<T> {
    type Item = StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        let row = self.buffer.pop_front()?;
        Some((self.decode)(row))
    }
}

impl<T> fmt::Debug for RowIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowIter")
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
