//! Conversion between entity values and column-keyed storage records.
//!
//! # Invariants
//! - Ignored fields never reach a record.
//! - Reading restores ignored fields from the prototype defaults.
//! - Reading is driven by the entity's field types: a column holding an
//!   integer is read as a boolean, and JSON text as a sequence or map,
//!   wherever the field asks for one. This holds for `Option` fields whose
//!   default is null as well.

use crate::mapping::schema::SchemaDescriptor;
use crate::model::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::storage::Record;
use serde::de::value::MapDeserializer;
use serde::de::{Deserializer, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::Value;

/// Serializes `item` into storage columns.
pub fn to_record<T: Entity>(schema: &SchemaDescriptor, item: &T) -> RepoResult<Record> {
    let mut fields = match serde_json::to_value(item) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(RepoError::InvalidData(format!(
                "{} no longer serializes to a struct",
                schema.entity_name()
            )))
        }
        Err(err) => {
            return Err(RepoError::InvalidData(format!(
                "failed to serialize {}: {err}",
                schema.entity_name()
            )))
        }
    };

    let mut record = Record::new();
    for binding in schema.columns() {
        let value = fields.remove(&binding.field).unwrap_or(Value::Null);
        record.insert(binding.column.clone(), value);
    }
    Ok(record)
}

/// Rebuilds an entity from a stored record.
pub fn from_record<T: Entity>(schema: &SchemaDescriptor, mut record: Record) -> RepoResult<T> {
    let mut fields = Vec::with_capacity(schema.columns().len() + schema.ignored_fields().len());
    for binding in schema.columns() {
        let stored = record.remove(&binding.column).unwrap_or(Value::Null);
        fields.push((binding.field.clone(), ColumnValue(stored)));
    }
    for (field, value) in schema.ignored_defaults() {
        fields.push((field.clone(), ColumnValue(value.clone())));
    }

    T::deserialize(MapDeserializer::<_, serde_json::Error>::new(fields.into_iter())).map_err(
        |err| {
            RepoError::InvalidData(format!(
                "row of `{}` does not match {}: {err}",
                schema.table_name(),
                schema.entity_name()
            ))
        },
    )
}

/// One stored column value, deserialized according to the requested type.
struct ColumnValue(Value);

impl ColumnValue {
    /// JSON text parsed back into an array or object; anything else as is.
    fn structured(self) -> Value {
        match self.0 {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ (Value::Array(_) | Value::Object(_))) => parsed,
                _ => Value::String(text),
            },
            other => other,
        }
    }
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for ColumnValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for ColumnValue {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_any(visitor)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Number(number) => match number.as_i64() {
                Some(flag) => visitor.visit_bool(flag != 0),
                None => Value::Number(number).deserialize_bool(visitor),
            },
            other => other.deserialize_bool(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(ColumnValue(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.structured().deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::{from_record, to_record};
    use crate::mapping::schema::{EntityMapping, SchemaDescriptor};
    use crate::model::entity::DataItem;
    use crate::repo::error::RepoError;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        id: i64,
        title: String,
        in_stock: bool,
        tags: Vec<String>,
        cache: Option<String>,
    }

    impl DataItem for Shelf {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::build::<Shelf>(
            &EntityMapping::table("shelves")
                .key("id")
                .column("title", "shelf_title")
                .ignore("cache"),
        )
        .unwrap()
    }

    #[test]
    fn record_uses_column_names_and_skips_ignored_fields() {
        let shelf = Shelf {
            id: 3,
            title: "top".to_string(),
            in_stock: true,
            tags: vec!["oak".to_string()],
            cache: Some("stale".to_string()),
        };
        let record = to_record(&schema(), &shelf).unwrap();

        assert_eq!(record.get("shelf_title"), Some(&json!("top")));
        assert_eq!(record.get("id"), Some(&json!(3)));
        assert!(!record.contains_key("title"));
        assert!(!record.contains_key("cache"));
    }

    #[test]
    fn sqlite_shaped_values_are_restored() {
        let mut record = crate::storage::Record::new();
        record.insert("id".to_string(), json!(9));
        record.insert("shelf_title".to_string(), json!("bottom"));
        record.insert("in_stock".to_string(), json!(1));
        record.insert("tags".to_string(), json!("[\"pine\",\"wide\"]"));

        let shelf: Shelf = from_record(&schema(), record).unwrap();
        assert_eq!(
            shelf,
            Shelf {
                id: 9,
                title: "bottom".to_string(),
                in_stock: true,
                tags: vec!["pine".to_string(), "wide".to_string()],
                cache: None,
            }
        );
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Tap {
        id: i64,
        on_draft: Option<bool>,
        styles: Option<Vec<String>>,
        layout: Option<Layout>,
        note: Option<String>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Layout {
        row: i64,
        label: String,
    }

    impl DataItem for Tap {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    #[test]
    fn optional_structured_fields_follow_the_field_type() {
        let schema = SchemaDescriptor::build::<Tap>(&EntityMapping::table("taps").key("id")).unwrap();
        let mut record = crate::storage::Record::new();
        record.insert("id".to_string(), json!(1));
        record.insert("on_draft".to_string(), json!(1));
        record.insert("styles".to_string(), json!("[\"stout\",\"porter\"]"));
        record.insert("layout".to_string(), json!("{\"row\":2,\"label\":\"left\"}"));
        record.insert("note".to_string(), json!("[not json"));

        let tap: Tap = from_record(&schema, record).unwrap();
        assert_eq!(
            tap,
            Tap {
                id: 1,
                on_draft: Some(true),
                styles: Some(vec!["stout".to_string(), "porter".to_string()]),
                layout: Some(Layout {
                    row: 2,
                    label: "left".to_string(),
                }),
                note: Some("[not json".to_string()),
            }
        );

        let mut empty = crate::storage::Record::new();
        empty.insert("id".to_string(), json!(2));
        let blank: Tap = from_record(&schema, empty).unwrap();
        assert_eq!(blank, Tap { id: 2, ..Tap::default() });
    }

    #[test]
    fn text_that_looks_like_json_stays_text_for_string_fields() {
        let mut record = crate::storage::Record::new();
        record.insert("id".to_string(), json!(4));
        record.insert("shelf_title".to_string(), json!("[\"a\"]"));
        record.insert("in_stock".to_string(), json!(0));
        record.insert("tags".to_string(), json!("[]"));

        let shelf: Shelf = from_record(&schema(), record).unwrap();
        assert_eq!(shelf.title, "[\"a\"]");
        assert!(!shelf.in_stock);
    }

    #[test]
    fn malformed_rows_surface_invalid_data() {
        let mut record = crate::storage::Record::new();
        record.insert("id".to_string(), json!(1));
        record.insert("shelf_title".to_string(), json!(42));
        record.insert("in_stock".to_string(), json!(0));
        record.insert("tags".to_string(), json!("[]"));

        let err = from_record::<Shelf>(&schema(), record).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }
}
