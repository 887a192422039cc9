//! Parameter binding and column extraction for the SQLite engine.

use crate::value::Value;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Blob(b) => ValueRef::Blob(b),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Integer(n) => ValueRef::Integer(*n),
            Value::Real(r) => ValueRef::Real(*r),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Err(FromSqlError::InvalidType),
            ValueRef::Integer(n) => Ok(Value::Integer(n)),
            ValueRef::Real(r) => Ok(Value::Real(r)),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .map(|s| Value::Text(s.to_owned()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(b) => Ok(Value::Blob(b.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn echo(value: &Value) -> Value {
        let conn = Connection::open_in_memory().unwrap();
        conn.query_row("SELECT ?1", [value], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn binds_every_storage_class() {
        for value in [
            Value::from(&[0_u8, 159, 146, 150]),
            Value::from("grüße 🦀"),
            Value::from(i64::MIN),
            Value::from(-0.25),
        ] {
            assert_eq!(echo(&value), value);
        }
    }

    #[test]
    fn null_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<Value> = conn.query_row("SELECT NULL", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn typeof_matches_storage_class() {
        let conn = Connection::open_in_memory().unwrap();
        let kind: String = conn
            .query_row("SELECT typeof(?1)", [Value::from(vec![1_u8])], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(kind, "blob");
    }
}
