//! Dynamic storage-class value type.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Declared column type, one per engine storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    /// Raw bytes. Also the type of untyped fields.
    #[default]
    Blob,
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
}

impl StorageType {
    /// Returns the SQL type name used in table definitions.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            StorageType::Blob => "BLOB",
            StorageType::Text => "TEXT",
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single value in one of the engine's storage classes.
///
/// Keys and value fields are both represented as `Value`. `NULL` has no
/// representation: every stored column is declared `NOT NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Binary blob.
    Blob(Vec<u8>),
    /// Text string.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
}

impl Value {
    /// Returns the zero value of a storage class.
    #[must_use]
    pub fn zero(storage: StorageType) -> Self {
        match storage {
            StorageType::Blob => Value::Blob(Vec::new()),
            StorageType::Text => Value::Text(String::new()),
            StorageType::Integer => Value::Integer(0),
            StorageType::Real => Value::Real(0.0),
        }
    }

    /// Returns the storage class of this value.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        match self {
            Value::Blob(_) => StorageType::Blob,
            Value::Text(_) => StorageType::Text,
            Value::Integer(_) => StorageType::Integer,
            Value::Real(_) => StorageType::Real,
        }
    }

    /// Get this value as bytes, if it is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Renders this value as an SQL literal.
    ///
    /// Only used for column defaults in `ALTER TABLE`, where bound
    /// parameters are not accepted by the engine.
    pub fn to_sql_literal(&self) -> CodecResult<String> {
        match self {
            Value::Blob(b) => {
                let mut out = String::with_capacity(b.len() * 2 + 3);
                out.push_str("X'");
                for byte in b {
                    out.push_str(&format!("{byte:02X}"));
                }
                out.push('\'');
                Ok(out)
            }
            Value::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Value::Integer(n) => Ok(n.to_string()),
            Value::Real(r) if r.is_finite() => Ok(format!("{r:?}")),
            Value::Real(_) => Err(CodecError::NonFiniteReal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Blob(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_sql_names() {
        assert_eq!(StorageType::Blob.as_sql(), "BLOB");
        assert_eq!(StorageType::Text.as_sql(), "TEXT");
        assert_eq!(StorageType::Integer.as_sql(), "INTEGER");
        assert_eq!(StorageType::Real.as_sql(), "REAL");
        assert_eq!(StorageType::default(), StorageType::Blob);
    }

    #[test]
    fn zero_values_match_storage() {
        for storage in [
            StorageType::Blob,
            StorageType::Text,
            StorageType::Integer,
            StorageType::Real,
        ] {
            assert_eq!(Value::zero(storage).storage_type(), storage);
        }
    }

    #[test]
    fn literals() {
        assert_eq!(Value::from(42).to_sql_literal().unwrap(), "42");
        assert_eq!(Value::from(-7).to_sql_literal().unwrap(), "-7");
        assert_eq!(Value::from(1.5).to_sql_literal().unwrap(), "1.5");
        assert_eq!(Value::from(2.0).to_sql_literal().unwrap(), "2.0");
        assert_eq!(Value::from("it's").to_sql_literal().unwrap(), "'it''s'");
        assert_eq!(
            Value::from(&[0x0a_u8, 0xff]).to_sql_literal().unwrap(),
            "X'0AFF'"
        );
        assert_eq!(Value::Blob(Vec::new()).to_sql_literal().unwrap(), "X''");
    }

    #[test]
    fn non_finite_literal_rejected() {
        assert_eq!(
            Value::Real(f64::NAN).to_sql_literal(),
            Err(CodecError::NonFiniteReal)
        );
        assert!(Value::Real(f64::INFINITY).to_sql_literal().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(&[1_u8, 2]).to_string(), "x'0102'");
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::from(5).as_integer(), Some(5));
        assert_eq!(Value::from(5).as_text(), None);
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert_eq!(Value::from(0.5).as_real(), Some(0.5));
        assert_eq!(Value::from(vec![1_u8]).as_blob(), Some(&[1_u8][..]));
        assert_eq!(Value::from(true), Value::Integer(1));
    }
}
