//! Shared parquet fixtures for integration tests

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Write `count` rows of {id: Int64, name: Utf8, score: Float64}
pub fn write_people_rows(path: &Path, count: usize) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("score", DataType::Float64, true),
    ]));
    let ids: Int64Array = (0..count as i64).collect();
    let names: StringArray = (0..count).map(|i| Some(format!("name-{:03}", i))).collect();
    let scores: Float64Array = (0..count).map(|i| Some(i as f64 * 1.5)).collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ids) as ArrayRef,
            Arc::new(names) as ArrayRef,
            Arc::new(scores) as ArrayRef,
        ],
    )
    .unwrap();
    write_batch(path, batch);
}

/// The standard 25-row fixture used by most tests
pub fn write_people_file(path: &Path) {
    write_people_rows(path, 25);
}

/// Two rows with a dotted column name
#[allow(dead_code)]
pub fn write_dotted_file(path: &Path) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a.b", DataType::Int64, false),
        Field::new("c", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
            Arc::new(StringArray::from(vec!["x", "y"])) as ArrayRef,
        ],
    )
    .unwrap();
    write_batch(path, batch);
}

fn write_batch(path: &Path, batch: RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}
