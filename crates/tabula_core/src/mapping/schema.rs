//! Entity mapping declarations and resolved schema descriptors.
//!
//! # Responsibility
//! - Accept per-type mapping declarations as plain configuration values.
//! - Validate declarations against the entity's serialized shape and turn
//!   them into immutable `SchemaDescriptor`s.
//!
//! # Invariants
//! - Every descriptor has exactly one integer key field.
//! - Key fields are never ignored.
//! - Storage column names are unique per descriptor and are plain SQL
//!   identifiers, so they can be interpolated into statements safely.

use crate::model::entity::{Entity, EntityType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const KEY_PROBE_VALUE: i64 = 7_331;

/// Declarative storage mapping for one entity type.
///
/// ```
/// use tabula_core::EntityMapping;
///
/// let mapping = EntityMapping::table("beverages")
///     .key("id")
///     .column("key", "beverage_key")
///     .ignore("cached_label");
/// assert_eq!(mapping.table_name(), Some("beverages"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMapping {
    table: Option<String>,
    key: Option<String>,
    columns: BTreeMap<String, String>,
    ignored: BTreeSet<String>,
}

impl EntityMapping {
    /// Starts a mapping bound to `name`.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: Some(name.into()),
            ..Self::default()
        }
    }

    /// Declares the identity field. A later call replaces an earlier one.
    pub fn key(mut self, field: impl Into<String>) -> Self {
        self.key = Some(field.into());
        self
    }

    /// Stores `field` under `column` instead of its own name.
    pub fn column(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(field.into(), column.into());
        self
    }

    /// Keeps `field` out of storage entirely.
    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.ignored.insert(field.into());
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Storage shape of one field, derived from the entity's default instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Bool,
    /// Arrays and nested objects, stored as JSON text.
    Json,
    /// Default value was null, so the shape is unknown.
    Any,
}

impl FieldKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Bool,
            Value::Number(number) if number.is_i64() || number.is_u64() => Self::Integer,
            Value::Number(_) => Self::Real,
            Value::String(_) => Self::Text,
            Value::Array(_) | Value::Object(_) => Self::Json,
        }
    }
}

/// One persisted field and the column that stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub field: String,
    pub column: String,
    pub kind: FieldKind,
}

/// Resolved, immutable storage mapping of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    entity: EntityType,
    table_name: String,
    key_field: String,
    key_column: String,
    columns: Vec<ColumnBinding>,
    column_aliases: BTreeMap<String, String>,
    ignored_fields: BTreeSet<String>,
    ignored_defaults: Map<String, Value>,
}

impl SchemaDescriptor {
    /// Validates `mapping` against the serialized shape of `T::default()`.
    ///
    /// # Errors
    /// - Any `MappingError` variant; all of them are configuration bugs.
    pub fn build<T: Entity>(mapping: &EntityMapping) -> Result<Self, MappingError> {
        let entity = EntityType::of::<T>();
        let name = entity.name();

        let table_name = match mapping.table.as_deref().map(str::trim) {
            Some(table) if !table.is_empty() => table.to_string(),
            _ => return Err(MappingError::MissingTable { entity: name }),
        };
        ensure_identifier(name, &table_name)?;

        let key_field = match mapping.key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Err(MappingError::MissingKey { entity: name }),
        };

        let prototype = serialize_fields::<T>(&T::default(), name)?;

        let key_value = prototype
            .get(&key_field)
            .ok_or_else(|| MappingError::UnknownField {
                entity: name,
                field: key_field.clone(),
            })?;
        if FieldKind::of(key_value) != FieldKind::Integer {
            return Err(MappingError::KeyNotInteger {
                entity: name,
                field: key_field,
            });
        }
        if mapping.ignored.contains(&key_field) {
            return Err(MappingError::KeyIgnored {
                entity: name,
                field: key_field,
            });
        }

        for field in mapping.columns.keys().chain(mapping.ignored.iter()) {
            if !prototype.contains_key(field) {
                return Err(MappingError::UnknownField {
                    entity: name,
                    field: field.clone(),
                });
            }
        }

        let mut seen_columns = HashSet::new();
        let mut columns = Vec::with_capacity(prototype.len());
        for (field, value) in &prototype {
            if mapping.ignored.contains(field) {
                continue;
            }
            let column = mapping
                .columns
                .get(field)
                .cloned()
                .unwrap_or_else(|| field.clone());
            ensure_identifier(name, &column)?;
            if !seen_columns.insert(column.to_ascii_lowercase()) {
                return Err(MappingError::DuplicateColumn {
                    entity: name,
                    column,
                });
            }
            columns.push(ColumnBinding {
                field: field.clone(),
                column,
                kind: FieldKind::of(value),
            });
        }

        let mut probe = T::default();
        probe.set_id(KEY_PROBE_VALUE);
        let probed = serialize_fields::<T>(&probe, name)?;
        if probed.get(&key_field).and_then(Value::as_i64) != Some(KEY_PROBE_VALUE) {
            return Err(MappingError::KeyAccessorMismatch {
                entity: name,
                field: key_field,
            });
        }

        let key_column = mapping
            .columns
            .get(&key_field)
            .cloned()
            .unwrap_or_else(|| key_field.clone());
        let ignored_defaults = mapping
            .ignored
            .iter()
            .filter_map(|field| {
                prototype
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();

        Ok(Self {
            entity,
            table_name,
            key_field,
            key_column,
            columns,
            column_aliases: mapping.columns.clone(),
            ignored_fields: mapping.ignored.clone(),
            ignored_defaults,
        })
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity.name()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Persisted fields in stable order, key included.
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn column_aliases(&self) -> &BTreeMap<String, String> {
        &self.column_aliases
    }

    pub fn ignored_fields(&self) -> &BTreeSet<String> {
        &self.ignored_fields
    }

    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignored_fields.contains(field)
    }

    /// Storage column for a persisted field; `None` for ignored or unknown
    /// fields.
    pub fn column_for(&self, field: &str) -> Option<&ColumnBinding> {
        self.columns.iter().find(|binding| binding.field == field)
    }

    pub(crate) fn ignored_defaults(&self) -> &Map<String, Value> {
        &self.ignored_defaults
    }
}

fn serialize_fields<T: Entity>(
    value: &T,
    entity: &'static str,
) -> Result<Map<String, Value>, MappingError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(MappingError::NotAStruct { entity }),
        Err(err) => Err(MappingError::Serialization {
            entity,
            message: err.to_string(),
        }),
    }
}

fn ensure_identifier(entity: &'static str, value: &str) -> Result<(), MappingError> {
    if IDENTIFIER_RE.is_match(value) {
        return Ok(());
    }
    Err(MappingError::InvalidIdentifier {
        entity,
        value: value.to_string(),
    })
}

/// Registration-time mapping failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    MissingTable { entity: &'static str },
    MissingKey { entity: &'static str },
    InvalidIdentifier { entity: &'static str, value: String },
    NotAStruct { entity: &'static str },
    Serialization { entity: &'static str, message: String },
    UnknownField { entity: &'static str, field: String },
    KeyNotInteger { entity: &'static str, field: String },
    KeyIgnored { entity: &'static str, field: String },
    KeyAccessorMismatch { entity: &'static str, field: String },
    DuplicateColumn { entity: &'static str, column: String },
    DuplicateRegistration { entity: &'static str },
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable { entity } => write!(f, "{entity}: no table declared"),
            Self::MissingKey { entity } => write!(f, "{entity}: no key declared"),
            Self::InvalidIdentifier { entity, value } => {
                write!(f, "{entity}: `{value}` is not a valid storage identifier")
            }
            Self::NotAStruct { entity } => {
                write!(f, "{entity}: entity must serialize to a struct or map")
            }
            Self::Serialization { entity, message } => {
                write!(f, "{entity}: failed to serialize default instance: {message}")
            }
            Self::UnknownField { entity, field } => {
                write!(f, "{entity}: field `{field}` does not exist")
            }
            Self::KeyNotInteger { entity, field } => {
                write!(f, "{entity}: key field `{field}` must hold an integer")
            }
            Self::KeyIgnored { entity, field } => {
                write!(f, "{entity}: key field `{field}` is also declared ignored")
            }
            Self::KeyAccessorMismatch { entity, field } => write!(
                f,
                "{entity}: `set_id` does not write the declared key field `{field}`"
            ),
            Self::DuplicateColumn { entity, column } => {
                write!(f, "{entity}: column `{column}` is mapped more than once")
            }
            Self::DuplicateRegistration { entity } => {
                write!(f, "{entity}: entity type is already registered")
            }
        }
    }
}

impl Error for MappingError {}
