//! # diskstore codec
//!
//! Storage-class values for diskstore.
//!
//! The engine stores every column in one of four storage classes. This
//! crate provides:
//! - [`Value`], a dynamic value in one of those classes
//! - [`StorageType`], the declared column type
//! - [`FieldValue`], mapping plain Rust field types to a storage class
//! - `rusqlite` parameter binding and column extraction for [`Value`]
//!
//! ## Usage
//!
//! ```
//! use diskstore_codec::{FieldValue, StorageType, Value};
//!
//! let value = 42_i64.to_value();
//! assert_eq!(value.storage_type(), StorageType::Integer);
//! assert_eq!(i64::from_value(value).unwrap(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod field;
mod sql;
mod value;

pub use error::{CodecError, CodecResult};
pub use field::FieldValue;
pub use value::{StorageType, Value};
