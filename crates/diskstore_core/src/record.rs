//! Value types that can be stored in a table.

use crate::error::{StoreError, StoreResult};
use crate::schema::{FieldDef, ValueSchema};
use diskstore_codec::{CodecError, FieldValue, Value};

/// A fixed-arity value stored as one table row.
///
/// Implementors describe their shape once through [`Record::schema`] and
/// convert to and from an ordered list of column values. Field order in
/// `to_values` and `from_values` must match the schema.
///
/// Most types implement this with [`impl_record!`](crate::impl_record):
///
/// ```
/// use diskstore_core::{impl_record, Record};
///
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i64,
///     y: i64,
///     label: String,
/// }
///
/// impl_record!(Point { x: i64, y: i64, label: String = "origin" });
///
/// let schema = Point::schema();
/// assert_eq!(schema.name(), "Point");
/// assert_eq!(schema.fields().len(), 3);
/// ```
pub trait Record: Sized {
    /// Describes the value shape.
    fn schema() -> ValueSchema;

    /// Converts the value into column values in schema order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuilds the value from column values in schema order.
    fn from_values(values: Vec<Value>) -> StoreResult<Self>;
}

/// Takes the next column value for `field` from a row.
#[doc(hidden)]
pub fn take_field<T: FieldValue>(
    values: &mut impl Iterator<Item = Value>,
    field: &str,
) -> StoreResult<T> {
    let value = values
        .next()
        .ok_or_else(|| CodecError::missing_field(field))?;
    T::from_value(value).map_err(|e| StoreError::invalid_value(format!("field {field}: {e}")))
}

/// The default value type: a single untyped field named `value`.
///
/// Its schema name, and so its default table name, is `Value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar(pub Value);

impl Scalar {
    /// Wraps a value.
    pub fn new(value: impl Into<Value>) -> Self {
        Scalar(value.into())
    }

    /// Returns the wrapped value.
    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        Scalar(value)
    }
}

impl Record for Scalar {
    fn schema() -> ValueSchema {
        ValueSchema::new("Value").field_def(FieldDef::untyped("value"))
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.0.clone()]
    }

    fn from_values(values: Vec<Value>) -> StoreResult<Self> {
        let mut values = values.into_iter();
        Ok(Scalar(take_field(&mut values, "value")?))
    }
}

macro_rules! tuple_record {
    ($name:literal; $($t:ident $idx:tt $field:literal),+) => {
        impl<$($t: FieldValue),+> Record for ($($t,)+) {
            fn schema() -> ValueSchema {
                ValueSchema::new($name)$(.field_def(FieldDef::of::<$t>($field)))+
            }

            fn to_values(&self) -> Vec<Value> {
                vec![$(self.$idx.to_value()),+]
            }

            fn from_values(values: Vec<Value>) -> StoreResult<Self> {
                let mut values = values.into_iter();
                Ok(($(take_field::<$t>(&mut values, $field)?,)+))
            }
        }
    };
}

tuple_record!("Tuple1"; A 0 "f0");
tuple_record!("Tuple2"; A 0 "f0", B 1 "f1");
tuple_record!("Tuple3"; A 0 "f0", B 1 "f1", C 2 "f2");
tuple_record!("Tuple4"; A 0 "f0", B 1 "f1", C 2 "f2", D 3 "f3");

/// Implements [`Record`] for a struct with named [`FieldValue`] fields.
///
/// Fields are listed in column order with their types. A field may carry a
/// default (`name: Type = expr`) used when the column is added to an
/// existing table; `expr` must convert into a [`Value`].
#[macro_export]
macro_rules! impl_record {
    ($ty:ident { $($field:ident : $fty:ty $(= $default:expr)?),+ $(,)? }) => {
        impl $crate::Record for $ty {
            fn schema() -> $crate::ValueSchema {
                $crate::ValueSchema::new(stringify!($ty))
                    $(.field_def(
                        $crate::FieldDef::of::<$fty>(stringify!($field))
                            $(.with_default($default))?
                    ))+
            }

            fn to_values(&self) -> ::std::vec::Vec<$crate::Value> {
                vec![$($crate::FieldValue::to_value(&self.$field)),+]
            }

            fn from_values(values: ::std::vec::Vec<$crate::Value>) -> $crate::StoreResult<Self> {
                let mut values = values.into_iter();
                Ok(Self {
                    $($field: $crate::record::take_field::<$fty>(&mut values, stringify!($field))?),+
                })
            }
        }
    };
}
