//! Precompiled SQL templates for one table.
//!
//! Built once per store from the table name, key type and derived schema.
//! Identifiers are quoted; values are always bound as parameters.

use crate::config::{KeyType, KEY_COLUMN};
use crate::schema::{quote_ident, DerivedSchema};

/// Operations with a precompiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    /// Point lookup of the value columns by key.
    Get,
    /// Existence check by key.
    Contains,
    /// Page of `(rowid, key)` in ascending rowid order after `?1`, `?2` rows.
    Iter,
    /// Page of `(rowid, key)` in descending rowid order before `?1`.
    Reversed,
    /// Page of `(rowid, key, columns...)` in ascending rowid order.
    Items,
    /// Page of `(rowid, key, columns...)` in descending rowid order.
    ItemsReversed,
    /// Row count.
    Count,
    /// Unrestricted select of `(rowid, key, columns...)`; callers append
    /// fragments.
    Query,
    /// Idempotent table creation.
    Create,
    /// Upsert.
    Set,
    /// Insert if absent, returning the key on success.
    Add,
    /// Delete by key.
    Delete,
    /// Delete every row, then reclaim space.
    Clear,
    /// Most recently inserted row.
    PopLast,
    /// Column listing of the table.
    TableInfo,
}

/// Immutable SQL text for every [`Statement`] of one table.
#[derive(Debug, Clone)]
pub struct Statements {
    get: String,
    contains: String,
    iter: String,
    reversed: String,
    items: String,
    items_reversed: String,
    count: String,
    query: String,
    create: String,
    set: String,
    add: String,
    delete: String,
    clear: String,
    pop_last: String,
    table_info: String,
}

impl Statements {
    /// Builds the statements for `table`.
    pub fn build(table: &str, key_type: KeyType, schema: &DerivedSchema) -> Self {
        let table = quote_ident(table);
        let key = quote_ident(KEY_COLUMN);
        let columns: Vec<String> = schema.columns().iter().map(|c| quote_ident(c)).collect();
        let fields = columns.join(", ");
        let definitions = columns
            .iter()
            .zip(schema.column_types())
            .map(|(column, storage)| format!("{column} {} NOT NULL", storage.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let excluded = columns
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let key_sql = key_type.storage_type().as_sql();

        Self {
            get: format!("SELECT {fields} FROM {table} WHERE {key} = ?1 LIMIT 1"),
            contains: format!("SELECT 1 FROM {table} WHERE {key} = ?1 LIMIT 1"),
            iter: format!(
                "SELECT rowid, {key} FROM {table} WHERE rowid > ?1 ORDER BY rowid ASC LIMIT ?2"
            ),
            reversed: format!(
                "SELECT rowid, {key} FROM {table} WHERE rowid < ?1 ORDER BY rowid DESC LIMIT ?2"
            ),
            items: format!(
                "SELECT rowid, {key}, {fields} FROM {table} \
                 WHERE rowid > ?1 ORDER BY rowid ASC LIMIT ?2"
            ),
            items_reversed: format!(
                "SELECT rowid, {key}, {fields} FROM {table} \
                 WHERE rowid < ?1 ORDER BY rowid DESC LIMIT ?2"
            ),
            count: format!("SELECT COUNT({key}) FROM {table}"),
            query: format!("SELECT rowid, {key}, {fields} FROM {table}"),
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} \
                 ({key} {key_sql} PRIMARY KEY NOT NULL, {definitions})"
            ),
            set: format!(
                "INSERT INTO {table} ({key}, {fields}) VALUES ({placeholders}) \
                 ON CONFLICT ({key}) DO UPDATE SET {excluded}"
            ),
            add: format!(
                "INSERT INTO {table} ({key}, {fields}) VALUES ({placeholders}) \
                 ON CONFLICT DO NOTHING RETURNING {key}"
            ),
            delete: format!("DELETE FROM {table} WHERE {key} = ?1"),
            clear: format!("DELETE FROM {table}; VACUUM;"),
            pop_last: format!(
                "SELECT {key}, {fields} FROM {table} ORDER BY rowid DESC LIMIT 1"
            ),
            table_info: format!("PRAGMA table_info({table})"),
        }
    }

    /// Returns the SQL text of a statement.
    pub fn sql(&self, statement: Statement) -> &str {
        match statement {
            Statement::Get => &self.get,
            Statement::Contains => &self.contains,
            Statement::Iter => &self.iter,
            Statement::Reversed => &self.reversed,
            Statement::Items => &self.items,
            Statement::ItemsReversed => &self.items_reversed,
            Statement::Count => &self.count,
            Statement::Query => &self.query,
            Statement::Create => &self.create,
            Statement::Set => &self.set,
            Statement::Add => &self.add,
            Statement::Delete => &self.delete,
            Statement::Clear => &self.clear,
            Statement::PopLast => &self.pop_last,
            Statement::TableInfo => &self.table_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueSchema;
    use diskstore_codec::{StorageType, Value};
    use rusqlite::Connection;

    fn statements(key_type: KeyType) -> Statements {
        let schema = ValueSchema::new("Point")
            .field("x", StorageType::Integer)
            .untyped("label")
            .derive()
            .unwrap();
        Statements::build("my \"points\"", key_type, &schema)
    }

    #[test]
    fn text_of_core_statements() {
        let s = statements(KeyType::Blob);
        assert_eq!(
            s.sql(Statement::Get),
            r#"SELECT "x", "label" FROM "my ""points""" WHERE "_key" = ?1 LIMIT 1"#
        );
        assert_eq!(
            s.sql(Statement::Create),
            r#"CREATE TABLE IF NOT EXISTS "my ""points""" ("_key" BLOB PRIMARY KEY NOT NULL, "x" INTEGER NOT NULL, "label" BLOB NOT NULL)"#
        );
        assert_eq!(
            s.sql(Statement::Set),
            r#"INSERT INTO "my ""points""" ("_key", "x", "label") VALUES (?1, ?2, ?3) ON CONFLICT ("_key") DO UPDATE SET "x" = excluded."x", "label" = excluded."label""#
        );
        assert!(s.sql(Statement::PopLast).ends_with("ORDER BY rowid DESC LIMIT 1"));
        assert_eq!(
            s.sql(Statement::Query),
            r#"SELECT rowid, "_key", "x", "label" FROM "my ""points""""#
        );
    }

    #[test]
    fn key_type_is_pinned_in_create() {
        assert!(statements(KeyType::Integer)
            .sql(Statement::Create)
            .contains("\"_key\" INTEGER PRIMARY KEY"));
        assert!(statements(KeyType::Text)
            .sql(Statement::Create)
            .contains("\"_key\" TEXT PRIMARY KEY"));
        assert!(statements(KeyType::Real)
            .sql(Statement::Create)
            .contains("\"_key\" REAL PRIMARY KEY"));
    }

    #[test]
    fn statements_prepare_against_engine() {
        let s = statements(KeyType::Blob);
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(s.sql(Statement::Create)).unwrap();

        for statement in [
            Statement::Get,
            Statement::Contains,
            Statement::Iter,
            Statement::Reversed,
            Statement::Items,
            Statement::ItemsReversed,
            Statement::Count,
            Statement::Query,
            Statement::Set,
            Statement::Add,
            Statement::Delete,
            Statement::PopLast,
            Statement::TableInfo,
        ] {
            conn.prepare(s.sql(statement))
                .unwrap_or_else(|e| panic!("{statement:?}: {e}"));
        }
    }

    #[test]
    fn upsert_and_add_semantics() {
        let s = statements(KeyType::Blob);
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(s.sql(Statement::Create)).unwrap();

        let row = [Value::from("k"), Value::from(1), Value::from("a")];
        conn.execute(s.sql(Statement::Set), rusqlite::params_from_iter(&row))
            .unwrap();
        let row = [Value::from("k"), Value::from(2), Value::from("b")];
        conn.execute(s.sql(Statement::Set), rusqlite::params_from_iter(&row))
            .unwrap();

        let x: i64 = conn
            .query_row(s.sql(Statement::Get), [Value::from("k")], |r| r.get(0))
            .unwrap();
        assert_eq!(x, 2);

        let mut add = conn.prepare(s.sql(Statement::Add)).unwrap();
        let returned: Vec<Value> = add
            .query_map(rusqlite::params_from_iter(&row), |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(returned.is_empty());
    }
}
