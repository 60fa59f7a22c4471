//! Backend and fetcher tests against on-disk parquet fixtures

mod common;

use std::sync::Arc;

use serde_json::json;

use pqv_core::backend::{Backend, Statement};
use pqv_core::paginator::{PageFetcher, PageQuery, Paginator};
use pqv_core::types::{DateTimeFormatSettings, SortDirection, SortSpec};
use pqv_core::DataError;
use pqv_data::backends::{DuckDbBackend, ParquetFileBackend};
use pqv_data::paginate::{DuckDbPageFetcher, ParquetPageFetcher};

async fn duckdb_fixture(dir: &tempfile::TempDir) -> DuckDbBackend {
    let path = dir.path().join("people.parquet");
    common::write_people_file(&path);
    let mut backend = DuckDbBackend::new(&path, DateTimeFormatSettings::default()).unwrap();
    backend.initialize().await.unwrap();
    backend
}

async fn parquet_fixture(dir: &tempfile::TempDir) -> ParquetFileBackend {
    let path = dir.path().join("people.parquet");
    common::write_people_file(&path);
    let mut backend = ParquetFileBackend::new(&path, DateTimeFormatSettings::default());
    backend.initialize().await.unwrap();
    backend
}

#[tokio::test]
async fn duckdb_backend_reads_schema_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let backend = duckdb_fixture(&dir).await;

    let schema = backend.schema();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema[0].index, 1);
    assert_eq!(schema[0].name, "id");
    assert_eq!(schema[0].type_name, "Int64");
    assert_eq!(schema[1].type_name, "String");

    let metadata = backend.metadata();
    let keys: Vec<&str> = metadata.iter().map(|entry| entry.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "file_name",
            "created_by",
            "num_rows",
            "num_row_groups",
            "format_version",
            "encryption_algorithm",
            "footer_signing_key_metadata",
        ]
    );
    assert_eq!(metadata[2].value, json!(25));
    assert_eq!(backend.row_count(), 25);
    backend.dispose();
}

#[tokio::test]
async fn duckdb_slice_returns_normalized_rows() {
    let dir = tempfile::tempdir().unwrap();
    let backend = duckdb_fixture(&dir).await;

    let rows = backend
        .query(&Statement::Slice {
            offset: 10,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    // 64-bit integers travel as strings
    assert_eq!(rows[0]["id"], json!("10"));
    assert_eq!(rows[0]["name"], json!("name-010"));
    assert_eq!(rows[0]["score"], json!(15.0));
    backend.dispose();
}

#[tokio::test]
async fn duckdb_runs_ad_hoc_sql() {
    let dir = tempfile::tempdir().unwrap();
    let backend = duckdb_fixture(&dir).await;

    let sql = format!("SELECT name FROM {} WHERE id = 7", backend.read_source());
    let rows = backend.query(&Statement::Sql(sql)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("name-007"));
    backend.dispose();
}

#[tokio::test]
async fn duckdb_dispose_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = duckdb_fixture(&dir).await;

    backend.dispose();
    backend.dispose();
    let err = backend
        .query(&Statement::Slice {
            offset: 0,
            limit: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)));
}

#[tokio::test]
async fn browse_pages_through_the_duckdb_fetcher() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(duckdb_fixture(&dir).await);

    let fetcher = DuckDbPageFetcher::for_file(Arc::clone(&backend));
    let mut paginator = Paginator::new(Box::new(fetcher), backend.row_count());
    let query = PageQuery::sized(10);

    let page = paginator.first_page(&query).await.unwrap();
    assert_eq!(page.rows.len(), 10);
    assert_eq!(page.page_count, 3);
    assert_eq!(page.rows[0]["id"], json!("0"));

    let page = paginator.last_page(&query).await.unwrap();
    assert_eq!(page.page_number, 3);
    assert_eq!(page.rows.len(), 5);
    assert_eq!(page.rows[0]["id"], json!("20"));

    let err = paginator.next_page(&query).await.unwrap_err();
    assert!(matches!(err, DataError::Boundary(_)));
    backend.dispose();
}

#[tokio::test]
async fn search_and_sort_filter_file_pages() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(duckdb_fixture(&dir).await);

    let fetcher = DuckDbPageFetcher::for_file(Arc::clone(&backend));
    let query = PageQuery {
        page_size: 25,
        page_number: None,
        sort: Some(SortSpec {
            field: "id".to_string(),
            direction: SortDirection::Descending,
        }),
        search: Some("name-01".to_string()),
    };
    let rows = fetcher.fetch_rows(0, 25, &query).await.unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0]["id"], json!("19"));
    backend.dispose();
}

#[tokio::test]
async fn parquet_backend_reads_footer_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let backend = parquet_fixture(&dir).await;

    assert_eq!(backend.row_count(), 25);
    let metadata = backend.metadata();
    assert_eq!(metadata[2].key, "num_rows");
    assert_eq!(metadata[2].value, json!(25));
    // The direct reader cannot see encryption details
    assert_eq!(metadata[5].value, json!(""));
    assert_eq!(metadata[6].value, json!(""));

    let schema = backend.schema();
    assert_eq!(schema[1].name, "name");
    assert_eq!(schema[1].type_name, "String");
}

#[tokio::test]
async fn parquet_backend_rejects_sql() {
    let dir = tempfile::tempdir().unwrap();
    let backend = parquet_fixture(&dir).await;

    let err = backend
        .query(&Statement::Sql("SELECT 1".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)));
}

#[tokio::test]
async fn parquet_slice_clips_at_the_end_of_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = parquet_fixture(&dir).await;

    let rows = backend
        .query(&Statement::Slice {
            offset: 20,
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["id"], json!("20"));
    assert_eq!(rows[4]["id"], json!("24"));
}

#[tokio::test]
async fn parquet_fetcher_rejects_pages_past_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(parquet_fixture(&dir).await);

    let fetcher = ParquetPageFetcher::new(Arc::clone(&backend));
    let err = fetcher
        .fetch_rows(30, 10, &PageQuery::sized(10))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::PageOutOfRange { .. }));

    let rows = fetcher.fetch_rows(0, 10, &PageQuery::sized(10)).await.unwrap();
    assert_eq!(rows.len(), 10);
}

#[tokio::test]
async fn disposed_parquet_backend_rejects_queries() {
    let dir = tempfile::tempdir().unwrap();
    let backend = parquet_fixture(&dir).await;

    backend.dispose();
    let err = backend
        .query(&Statement::Slice {
            offset: 0,
            limit: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)));
}
