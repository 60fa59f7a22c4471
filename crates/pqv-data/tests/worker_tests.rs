//! End-to-end tests for the query worker

mod common;

use std::path::PathBuf;

use serde_json::json;

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pqv_core::paginator::PageQuery;
use pqv_core::protocol::PageAction;
use pqv_core::types::{DateTimeFormatSettings, ExportFormat, SortDirection, SortSpec};
use pqv_core::DataError;
use pqv_data::worker;

const ALL_ROWS: &str = "SELECT * FROM data";

fn people_fixture(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("people.parquet");
    common::write_people_file(&path);
    path
}

fn sort_by_id_desc() -> SortSpec {
    SortSpec {
        field: "id".to_string(),
        direction: SortDirection::Descending,
    }
}

#[tokio::test]
async fn query_returns_the_first_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();

    let response = handle.query(ALL_ROWS, 10).await.unwrap();
    assert_eq!(response.headers, vec!["id", "name", "score"]);
    assert_eq!(response.rows.len(), 10);
    assert_eq!(response.rows[0]["id"], json!("0"));
    assert_eq!(response.row_count, 25);
    assert_eq!(response.page_number, 1);
    assert_eq!(response.page_count, 3);
    assert_eq!(response.page_size, 10);

    assert_eq!(response.schema.len(), 3);
    assert_eq!(response.schema[0]["column_name"], json!("id"));
    assert_eq!(response.schema[0]["column_type"], json!("BIGINT"));
    assert_eq!(response.schema[1]["column_name"], json!("name"));
}

#[tokio::test]
async fn query_without_the_data_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();

    let err = handle.query("SELECT 1", 10).await.unwrap_err();
    assert!(matches!(err, DataError::Validation(_)));
    assert!(err.to_string().contains("must contain 'FROM data'"));

    // Nothing materialized, so dependent requests fail too
    let err = handle.search("x", None, 10).await.unwrap_err();
    assert!(matches!(err, DataError::Validation(_)));
}

#[tokio::test]
async fn search_narrows_and_resets_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let response = handle.search("name-01", None, 10).await.unwrap();
    assert_eq!(response.row_count, 10);
    assert_eq!(response.page_count, 1);
    assert_eq!(response.rows.len(), 10);

    let response = handle.search("name-012", None, 10).await.unwrap();
    assert_eq!(response.row_count, 1);
    assert_eq!(response.rows[0]["id"], json!("12"));

    let response = handle.search("", None, 10).await.unwrap();
    assert_eq!(response.row_count, 25);
    assert_eq!(response.page_count, 3);
}

#[tokio::test]
async fn page_actions_navigate_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let page = handle
        .page(PageAction::Next, PageQuery::sized(10))
        .await
        .unwrap();
    assert_eq!(page.page_number, 2);
    assert_eq!(page.rows[0]["id"], json!("10"));

    let page = handle
        .page(PageAction::Last, PageQuery::sized(10))
        .await
        .unwrap();
    assert_eq!(page.page_number, 3);
    assert_eq!(page.rows.len(), 5);

    let err = handle
        .page(PageAction::Next, PageQuery::sized(10))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Boundary(_)));

    let page = handle
        .page(PageAction::Prev, PageQuery::sized(10))
        .await
        .unwrap();
    assert_eq!(page.page_number, 2);

    let page = handle
        .page(
            PageAction::Current,
            PageQuery {
                page_size: 10,
                page_number: Some(1),
                sort: None,
                search: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.page_number, 1);

    let page = handle
        .page(
            PageAction::First,
            PageQuery {
                page_size: 10,
                page_number: None,
                sort: Some(sort_by_id_desc()),
                search: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.rows[0]["id"], json!("24"));
}

#[tokio::test]
async fn export_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let out = dir.path().join("out.csv");
    let response = handle
        .export(ExportFormat::Csv, out.clone(), None, None)
        .await
        .unwrap();
    assert_eq!(response.path, out);

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id,name,score");
    assert_eq!(lines.len(), 26);
}

#[tokio::test]
async fn export_applies_the_search_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let out = dir.path().join("out.json");
    handle
        .export(
            ExportFormat::Json,
            out.clone(),
            Some("name-012".to_string()),
            None,
        )
        .await
        .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let rows = value.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("name-012"));
}

#[tokio::test]
async fn export_writes_one_json_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let out = dir.path().join("out.ndjson");
    handle
        .export(ExportFormat::Ndjson, out.clone(), None, None)
        .await
        .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().count(), 25);
    let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["name"], json!("name-000"));
}

#[tokio::test]
async fn export_round_trips_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let out = dir.path().join("out.parquet");
    handle
        .export(ExportFormat::Parquet, out.clone(), None, None)
        .await
        .unwrap();

    let file = std::fs::File::open(&out).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    assert_eq!(builder.metadata().file_metadata().num_rows(), 25);
}

#[tokio::test]
async fn failed_query_clears_the_previous_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();
    handle.query(ALL_ROWS, 10).await.unwrap();

    let err = handle
        .query("SELECT nope FROM data", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)));

    let err = handle
        .page(PageAction::Next, PageQuery::sized(10))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Validation(_)));
}

#[tokio::test]
async fn requery_sees_new_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path.clone(), DateTimeFormatSettings::default())
        .await
        .unwrap();

    let response = handle.query(ALL_ROWS, 10).await.unwrap();
    assert_eq!(response.row_count, 25);

    common::write_people_rows(&path, 10);
    let response = handle.query(ALL_ROWS, 10).await.unwrap();
    assert_eq!(response.row_count, 10);
}

#[tokio::test]
async fn export_before_any_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();

    let err = handle
        .export(ExportFormat::Csv, dir.path().join("out.csv"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Validation(_)));
}

#[tokio::test]
async fn dotted_column_names_are_sanitized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dotted.parquet");
    common::write_dotted_file(&path);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();

    let response = handle.query(ALL_ROWS, 10).await.unwrap();
    assert_eq!(response.headers, vec!["a_b", "c"]);
    assert_eq!(response.rows[0]["a_b"], json!("1"));
}

#[tokio::test]
async fn empty_result_keeps_schema_headers() {
    let dir = tempfile::tempdir().unwrap();
    let path = people_fixture(&dir);
    let handle = worker::spawn(path, DateTimeFormatSettings::default())
        .await
        .unwrap();

    let response = handle
        .query("SELECT * FROM data WHERE id < 0", 10)
        .await
        .unwrap();
    assert_eq!(response.row_count, 0);
    assert_eq!(response.page_count, 1);
    assert!(response.rows.is_empty());
    assert_eq!(response.headers, vec!["id", "name", "score"]);
}
