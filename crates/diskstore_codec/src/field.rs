//! Mapping between Rust field types and storage classes.

use crate::error::{CodecError, CodecResult};
use crate::value::{StorageType, Value};

/// A Rust type that can be stored in a single column.
///
/// `STORAGE` is the declared column type. `None` means the field is
/// untyped and accepts any storage class, which maps to a `BLOB` column.
pub trait FieldValue: Sized {
    /// Declared storage class, or `None` for untyped fields.
    const STORAGE: Option<StorageType>;

    /// Converts a field into a storage value.
    fn to_value(&self) -> Value;

    /// Converts a stored value back into the field type.
    fn from_value(value: Value) -> CodecResult<Self>;
}

impl FieldValue for Value {
    const STORAGE: Option<StorageType> = None;

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        Ok(value)
    }
}

impl FieldValue for i64 {
    const STORAGE: Option<StorageType> = Some(StorageType::Integer);

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(CodecError::type_mismatch("i64", other.storage_type())),
        }
    }
}

impl FieldValue for i32 {
    const STORAGE: Option<StorageType> = Some(StorageType::Integer);

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| CodecError::OutOfRange {
            value: n,
            target: "i32",
        })
    }
}

impl FieldValue for u32 {
    const STORAGE: Option<StorageType> = Some(StorageType::Integer);

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        let n = i64::from_value(value)?;
        u32::try_from(n).map_err(|_| CodecError::OutOfRange {
            value: n,
            target: "u32",
        })
    }
}

impl FieldValue for bool {
    const STORAGE: Option<StorageType> = Some(StorageType::Integer);

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FieldValue for f64 {
    const STORAGE: Option<StorageType> = Some(StorageType::Real);

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    // REAL affinity keeps integral values as REAL, but expressions in
    // queries can still hand back integers.
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(n) => Ok(n as f64),
            other => Err(CodecError::type_mismatch("f64", other.storage_type())),
        }
    }
}

impl FieldValue for String {
    const STORAGE: Option<StorageType> = Some(StorageType::Text);

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(CodecError::type_mismatch("String", other.storage_type())),
        }
    }
}

impl FieldValue for Vec<u8> {
    const STORAGE: Option<StorageType> = Some(StorageType::Blob);

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(CodecError::type_mismatch("Vec<u8>", other.storage_type())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_storage() {
        assert_eq!(<i64 as FieldValue>::STORAGE, Some(StorageType::Integer));
        assert_eq!(<f64 as FieldValue>::STORAGE, Some(StorageType::Real));
        assert_eq!(<String as FieldValue>::STORAGE, Some(StorageType::Text));
        assert_eq!(<Vec<u8> as FieldValue>::STORAGE, Some(StorageType::Blob));
        assert_eq!(<Value as FieldValue>::STORAGE, None);
    }

    #[test]
    fn narrowing_checks_range() {
        assert_eq!(i32::from_value(Value::Integer(7)).unwrap(), 7);
        assert!(matches!(
            i32::from_value(Value::Integer(i64::MAX)),
            Err(CodecError::OutOfRange { target: "i32", .. })
        ));
        assert!(u32::from_value(Value::Integer(-1)).is_err());
    }

    #[test]
    fn mismatched_class_is_rejected() {
        let err = String::from_value(Value::Integer(1)).unwrap_err();
        assert_eq!(
            err,
            CodecError::type_mismatch("String", StorageType::Integer)
        );
        assert!(Vec::<u8>::from_value(Value::from("x")).is_err());
    }

    #[test]
    fn real_accepts_integers() {
        assert_eq!(f64::from_value(Value::Integer(3)).unwrap(), 3.0);
    }

    #[test]
    fn bool_roundtrip() {
        assert!(bool::from_value(true.to_value()).unwrap());
        assert!(!bool::from_value(false.to_value()).unwrap());
    }
}
