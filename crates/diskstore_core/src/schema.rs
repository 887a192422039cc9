//! Value schema description and column derivation.
//!
//! A [`ValueSchema`] is the caller-supplied description of a value shape:
//! an ordered list of named fields, each with an optional storage type and
//! an optional default. [`ValueSchema::derive`] resolves it once into the
//! column metadata used to create, migrate and query the backing table.

use crate::config::KEY_COLUMN;
use crate::error::{StoreError, StoreResult};
use diskstore_codec::{FieldValue, StorageType, Value};
use std::collections::{HashMap, HashSet};

/// Description of a single value field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Declared storage type. `None` maps to `BLOB`.
    pub storage: Option<StorageType>,
    /// Default used when the column is added to an existing table.
    pub default: Option<Value>,
}

impl FieldDef {
    /// Creates a typed field.
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            storage: Some(storage),
            default: None,
        }
    }

    /// Creates an untyped field.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: None,
            default: None,
        }
    }

    /// Creates a field typed after a Rust field type.
    pub fn of<T: FieldValue>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: T::STORAGE,
            default: None,
        }
    }

    /// Sets the migration default.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered description of a value shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSchema {
    name: String,
    fields: Vec<FieldDef>,
}

impl ValueSchema {
    /// Creates an empty schema with the given type name.
    ///
    /// The name is the default table name for stores of this shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a typed field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, storage: StorageType) -> Self {
        self.fields.push(FieldDef::new(name, storage));
        self
    }

    /// Appends an untyped field.
    #[must_use]
    pub fn untyped(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::untyped(name));
        self
    }

    /// Appends a fully specified field.
    #[must_use]
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Resolves the schema into column metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if the schema has no name or no
    /// fields, a field is named after the key column, a name repeats, or a
    /// default does not fit its field.
    pub fn derive(&self) -> StoreResult<DerivedSchema> {
        if self.name.is_empty() {
            return Err(StoreError::schema("value schema needs a name"));
        }
        if self.fields.is_empty() {
            return Err(StoreError::schema(format!(
                "value schema {} has no fields",
                self.name
            )));
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        let mut names = Vec::with_capacity(self.fields.len());
        let mut types = Vec::with_capacity(self.fields.len());
        let mut defaults = HashMap::with_capacity(self.fields.len());

        for field in &self.fields {
            if field.name == KEY_COLUMN {
                return Err(StoreError::schema(format!(
                    "name {KEY_COLUMN} is not allowed as a field of {}",
                    self.name
                )));
            }
            if field.name.is_empty() {
                return Err(StoreError::schema(format!(
                    "value schema {} has an unnamed field",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::schema(format!(
                    "field {} appears twice in {}",
                    field.name, self.name
                )));
            }

            let storage = field.storage.unwrap_or_default();
            let default = match &field.default {
                Some(value) => {
                    if field.storage.is_some() && value.storage_type() != storage {
                        return Err(StoreError::schema(format!(
                            "default for {} is {}, field is {}",
                            field.name,
                            value.storage_type(),
                            storage
                        )));
                    }
                    value.to_sql_literal().map_err(|e| {
                        StoreError::schema(format!("default for {}: {e}", field.name))
                    })?;
                    value.clone()
                }
                None => Value::zero(storage),
            };

            names.push(field.name.clone());
            types.push(storage);
            defaults.insert(field.name.clone(), default);
        }

        Ok(DerivedSchema {
            name: self.name.clone(),
            typed: self.fields.iter().map(|f| f.storage.is_some()).collect(),
            names,
            types,
            defaults,
        })
    }
}

/// Column metadata derived from a [`ValueSchema`].
///
/// Column order is fixed and determines the positional mapping between
/// rows and values.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSchema {
    name: String,
    names: Vec<String>,
    types: Vec<StorageType>,
    typed: Vec<bool>,
    defaults: HashMap<String, Value>,
}

impl DerivedSchema {
    /// Returns the schema type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column names in order.
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    /// Returns the column storage types in order.
    pub fn column_types(&self) -> &[StorageType] {
        &self.types
    }

    /// Returns the migration default of a column.
    pub fn default_for(&self, column: &str) -> Option<&Value> {
        self.defaults.get(column)
    }

    /// Returns the number of value columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false: derivation rejects empty schemas.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Checks that a value tuple has this schema's shape.
    ///
    /// Typed fields must hold their declared storage class, except that an
    /// integer is accepted for a `REAL` field.
    pub fn validate(&self, values: &[Value]) -> StoreResult<()> {
        if values.len() != self.names.len() {
            return Err(StoreError::invalid_value(format!(
                "{} expects {} fields, got {}",
                self.name,
                self.names.len(),
                values.len()
            )));
        }
        for (((name, storage), typed), value) in self
            .names
            .iter()
            .zip(&self.types)
            .zip(&self.typed)
            .zip(values)
        {
            let found = value.storage_type();
            let widening = *storage == StorageType::Real && found == StorageType::Integer;
            if *typed && found != *storage && !widening {
                return Err(StoreError::invalid_value(format!(
                    "field {name} of {} must be {storage}, got {found}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> ValueSchema {
        ValueSchema::new("Point")
            .field("x", StorageType::Integer)
            .field("y", StorageType::Real)
            .untyped("payload")
    }

    #[test]
    fn derives_columns_in_order() {
        let derived = point().derive().unwrap();
        assert_eq!(derived.columns(), ["x", "y", "payload"]);
        assert_eq!(
            derived.column_types(),
            [StorageType::Integer, StorageType::Real, StorageType::Blob]
        );
        assert_eq!(derived.name(), "Point");
        assert_eq!(derived.len(), 3);
    }

    #[test]
    fn defaults_fall_back_to_zero_values() {
        let derived = point()
            .field_def(FieldDef::new("label", StorageType::Text).with_default("none"))
            .derive()
            .unwrap();
        assert_eq!(derived.default_for("x"), Some(&Value::Integer(0)));
        assert_eq!(derived.default_for("y"), Some(&Value::Real(0.0)));
        assert_eq!(derived.default_for("payload"), Some(&Value::Blob(Vec::new())));
        assert_eq!(derived.default_for("label"), Some(&Value::from("none")));
        assert_eq!(derived.default_for("missing"), None);
    }

    #[test]
    fn key_column_name_is_reserved() {
        let err = ValueSchema::new("Bad")
            .field("_key", StorageType::Text)
            .derive()
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[test]
    fn rejects_empty_and_duplicate_fields() {
        assert!(ValueSchema::new("Empty").derive().is_err());
        assert!(ValueSchema::new("").untyped("a").derive().is_err());
        assert!(ValueSchema::new("Dup")
            .untyped("a")
            .field("a", StorageType::Text)
            .derive()
            .is_err());
    }

    #[test]
    fn rejects_mismatched_or_non_finite_defaults() {
        let mismatched = ValueSchema::new("T")
            .field_def(FieldDef::new("n", StorageType::Integer).with_default("zero"))
            .derive();
        assert!(matches!(mismatched, Err(StoreError::Schema { .. })));

        let nan = ValueSchema::new("T")
            .field_def(FieldDef::new("r", StorageType::Real).with_default(f64::NAN))
            .derive();
        assert!(matches!(nan, Err(StoreError::Schema { .. })));
    }

    #[test]
    fn validate_checks_arity_and_types() {
        let derived = point().derive().unwrap();
        derived
            .validate(&[Value::from(1), Value::from(2.5), Value::from("any")])
            .unwrap();
        // integer widens into REAL
        derived
            .validate(&[Value::from(1), Value::from(2), Value::from(vec![0_u8])])
            .unwrap();

        let arity = derived.validate(&[Value::from(1)]).unwrap_err();
        assert!(matches!(arity, StoreError::InvalidValue { .. }));

        let typed = derived
            .validate(&[Value::from("1"), Value::from(2.5), Value::from(0)])
            .unwrap_err();
        assert!(matches!(typed, StoreError::InvalidValue { .. }));
    }

    #[test]
    fn field_def_of_rust_type() {
        assert_eq!(FieldDef::of::<String>("s").storage, Some(StorageType::Text));
        assert_eq!(FieldDef::of::<Value>("v").storage, None);
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("data"), "\"data\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident("with space"), "\"with space\"");
    }
}
