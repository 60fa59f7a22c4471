//! Backend contract for reading columnar files

use std::path::Path;

use arrow::datatypes::{DataType, Schema, SchemaRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Row;
use crate::DataError;

/// Statement dialect understood by [`Backend::query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Arbitrary SQL; only the embedded SQL backend accepts this
    Sql(String),
    /// A contiguous row window, supported by both backends
    Slice { offset: usize, limit: usize },
}

/// One column of the file schema.
///
/// `index` is 1-based. `type_name` is the rendered type: scalar types use
/// the arrow name (with `Utf8` renamed to `String`), lists render as a
/// one-element JSON array of the child type, structs as a JSON object of
/// child types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub nullable: bool,
    pub metadata: String,
}

impl ColumnDescriptor {
    /// Parse every field of an arrow schema into descriptors
    pub fn from_schema(schema: &Schema) -> Vec<ColumnDescriptor> {
        schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| ColumnDescriptor {
                index: i + 1,
                name: field.name().clone(),
                type_name: type_name(field.data_type()),
                nullable: field.is_nullable(),
                metadata: serde_json::to_string(field.metadata()).unwrap_or_default(),
            })
            .collect()
    }
}

fn type_value(data_type: &DataType) -> serde_json::Value {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) | DataType::FixedSizeList(field, _) => {
            serde_json::Value::Array(vec![type_value(field.data_type())])
        }
        DataType::Struct(fields) => {
            let mut children = serde_json::Map::new();
            for field in fields {
                children.insert(field.name().clone(), type_value(field.data_type()));
            }
            serde_json::Value::Object(children)
        }
        other => serde_json::Value::String(
            format!("{}", other)
                .replace("LargeUtf8", "LargeString")
                .replace("Utf8", "String"),
        ),
    }
}

/// Rendered type name; non-scalar descriptions collapse to JSON text
fn type_name(data_type: &DataType) -> String {
    match type_value(data_type) {
        serde_json::Value::String(name) => name,
        nested => nested.to_string(),
    }
}

/// One file-level metadata entry; entries keep a fixed key order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl MetadataEntry {
    pub fn new(key: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// A data source for one columnar file.
///
/// `initialize` must run once before any accessor; the accessors are pure
/// reads of state cached during initialization and panic if called early.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the file and cache schema, metadata and row count.
    ///
    /// Fails with [`DataError::Initialization`] if the file is unreadable
    /// or not valid parquet; the caller may fall back to another backend.
    async fn initialize(&mut self) -> Result<(), DataError>;

    /// Arrow schema of the file.
    ///
    /// # Panics
    /// Panics if `initialize` has not completed.
    fn arrow_schema(&self) -> SchemaRef;

    /// Parsed per-column descriptors.
    ///
    /// # Panics
    /// Panics if `initialize` has not completed.
    fn schema(&self) -> Vec<ColumnDescriptor>;

    /// File-level metadata in fixed key order.
    ///
    /// # Panics
    /// Panics if `initialize` has not completed.
    fn metadata(&self) -> Vec<MetadataEntry>;

    /// Total row count of the file, as recorded during initialization.
    fn row_count(&self) -> usize;

    /// Run a statement and return normalized rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, DataError>;

    /// Release the underlying engine or file handle. Idempotent; queries
    /// after disposal fail with [`DataError::Query`].
    fn dispose(&self);

    /// Path of the backing file
    fn path(&self) -> &Path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Fields, TimeUnit};
    use std::collections::HashMap;

    #[test]
    fn descriptors_are_one_indexed() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        let descriptors = ColumnDescriptor::from_schema(&schema);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].index, 1);
        assert_eq!(descriptors[0].name, "id");
        assert_eq!(descriptors[0].type_name, "Int64");
        assert!(!descriptors[0].nullable);
        assert_eq!(descriptors[1].index, 2);
        assert_eq!(descriptors[1].type_name, "String");
        assert!(descriptors[1].nullable);
    }

    #[test]
    fn utf8_renders_as_string() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("b", DataType::LargeUtf8, true),
            Field::new(
                "c",
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                true,
            ),
        ]);
        let descriptors = ColumnDescriptor::from_schema(&schema);
        assert_eq!(descriptors[0].type_name, "String");
        assert_eq!(descriptors[1].type_name, "LargeString");
        assert_eq!(descriptors[2].type_name, "Dictionary(Int32, String)");
    }

    #[test]
    fn nested_types_render_as_json() {
        let item = Field::new("item", DataType::Int32, true);
        let schema = Schema::new(vec![
            Field::new("xs", DataType::List(item.into()), true),
            Field::new(
                "point",
                DataType::Struct(Fields::from(vec![
                    Field::new("x", DataType::Float64, true),
                    Field::new("label", DataType::Utf8, true),
                ])),
                true,
            ),
        ]);
        let descriptors = ColumnDescriptor::from_schema(&schema);
        assert_eq!(descriptors[0].type_name, "[\"Int32\"]");
        assert_eq!(
            descriptors[1].type_name,
            "{\"x\":\"Float64\",\"label\":\"String\"}"
        );
    }

    #[test]
    fn timestamp_keeps_arrow_rendering() {
        let schema = Schema::new(vec![Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]);
        let descriptors = ColumnDescriptor::from_schema(&schema);
        assert_eq!(descriptors[0].type_name, "Timestamp(Microsecond, None)");
    }

    #[test]
    fn field_metadata_serializes() {
        let mut metadata = HashMap::new();
        metadata.insert("origin".to_string(), "sensor".to_string());
        let field = Field::new("id", DataType::Int64, false).with_metadata(metadata);
        let schema = Schema::new(vec![field]);
        let descriptors = ColumnDescriptor::from_schema(&schema);
        assert_eq!(descriptors[0].metadata, "{\"origin\":\"sensor\"}");
    }
}
