//! Embedded-SQL backend backed by an in-memory DuckDB instance

use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::Connection;
use parking_lot::Mutex;
use tracing::{debug, warn};

use pqv_core::backend::{Backend, ColumnDescriptor, MetadataEntry, Statement};
use pqv_core::types::{DateTimeFormatSettings, Row};
use pqv_core::DataError;

use crate::normalize::batch_to_rows;
use crate::sql::escape_literal;

/// Extension setup for spreadsheet export; everything else works without it
pub(crate) const SPATIAL_SETUP: &str = "INSTALL spatial; LOAD spatial;";

/// Backend that queries the parquet file through DuckDB's `read_parquet`.
///
/// The connection lives behind a mutex because DuckDB connections are not
/// `Sync`; `dispose` takes the connection out, so every later call sees a
/// closed backend.
pub struct DuckDbBackend {
    path: PathBuf,
    datetime_format: DateTimeFormatSettings,
    conn: Mutex<Option<Connection>>,
    schema: Option<SchemaRef>,
    metadata: Option<Vec<MetadataEntry>>,
    row_count: usize,
}

impl DuckDbBackend {
    pub fn new(
        path: impl Into<PathBuf>,
        datetime_format: DateTimeFormatSettings,
    ) -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DataError::Initialization(format!("Failed to open DuckDB: {}", e)))?;
        Ok(Self {
            path: path.into(),
            datetime_format,
            conn: Mutex::new(Some(conn)),
            schema: None,
            metadata: None,
            row_count: 0,
        })
    }

    /// The `FROM` source that reads the backing file
    pub fn read_source(&self) -> String {
        format!("read_parquet('{}')", escape_literal(&self.path.to_string_lossy()))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DataError>,
    ) -> Result<T, DataError> {
        let guard = self.conn.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(DataError::Query("Backend is disposed".to_string())),
        }
    }

    /// Run a statement and normalize every result row
    pub(crate) fn query_rows(&self, sql: &str) -> Result<Vec<Row>, DataError> {
        debug!(sql, "duckdb query");
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| DataError::Query(e.to_string()))?;
            let batches: Vec<RecordBatch> = stmt
                .query_arrow([])
                .map_err(|e| DataError::Query(e.to_string()))?
                .collect();
            let mut rows = Vec::new();
            for batch in &batches {
                rows.extend(batch_to_rows(batch, &self.datetime_format)?);
            }
            Ok(rows)
        })
    }

    /// Run one or more statements for their side effects
    pub(crate) fn execute_sql(&self, sql: &str) -> Result<(), DataError> {
        debug!(sql, "duckdb execute");
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| DataError::Query(e.to_string()))
        })
    }

    /// Run a statement whose first column of the first row is a count
    pub(crate) fn query_count(&self, sql: &str) -> Result<usize, DataError> {
        debug!(sql, "duckdb count");
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(|e| DataError::Query(e.to_string()))?;
            Ok(count.max(0) as usize)
        })
    }

    pub(crate) fn datetime_format(&self) -> &DateTimeFormatSettings {
        &self.datetime_format
    }

    fn load_schema(&self) -> Result<SchemaRef, DataError> {
        let sql = format!("SELECT * FROM {} LIMIT 10", self.read_source());
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| DataError::Initialization(format!("Failed to read schema: {}", e)))?;
            let arrow = stmt
                .query_arrow([])
                .map_err(|e| DataError::Initialization(format!("Failed to read schema: {}", e)))?;
            Ok(arrow.get_schema())
        })
    }

    fn load_metadata(&self) -> Result<(Vec<MetadataEntry>, usize), DataError> {
        let sql = format!(
            "SELECT file_name, created_by, num_rows, num_row_groups, format_version, \
             encryption_algorithm, footer_signing_key_metadata FROM parquet_file_metadata('{}')",
            escape_literal(&self.path.to_string_lossy())
        );
        self.with_conn(|conn| {
            let (file_name, created_by, num_rows, num_row_groups, format_version, encryption, signing) =
                conn.query_row(&sql, [], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })
                .map_err(|e| {
                    DataError::Initialization(format!("Failed to read file metadata: {}", e))
                })?;
            let entries = vec![
                MetadataEntry::new("file_name", file_name),
                MetadataEntry::new("created_by", created_by.unwrap_or_default()),
                MetadataEntry::new("num_rows", num_rows),
                MetadataEntry::new("num_row_groups", num_row_groups),
                MetadataEntry::new("format_version", format_version),
                MetadataEntry::new("encryption_algorithm", encryption.unwrap_or_default()),
                MetadataEntry::new("footer_signing_key_metadata", signing.unwrap_or_default()),
            ];
            Ok((entries, num_rows.max(0) as usize))
        })
    }
}

#[async_trait]
impl Backend for DuckDbBackend {
    async fn initialize(&mut self) -> Result<(), DataError> {
        if let Err(e) = self.execute_sql(SPATIAL_SETUP) {
            warn!("Spatial extension unavailable, spreadsheet export will fail: {}", e);
        }

        let schema = self.load_schema()?;
        let (metadata, row_count) = self.load_metadata()?;
        self.schema = Some(schema);
        self.metadata = Some(metadata);
        self.row_count = row_count;
        Ok(())
    }

    fn arrow_schema(&self) -> SchemaRef {
        self.schema.as_ref().expect("backend not initialized").clone()
    }

    fn schema(&self) -> Vec<ColumnDescriptor> {
        ColumnDescriptor::from_schema(self.schema.as_ref().expect("backend not initialized"))
    }

    fn metadata(&self) -> Vec<MetadataEntry> {
        self.metadata.as_ref().expect("backend not initialized").clone()
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, DataError> {
        match statement {
            Statement::Sql(sql) => self.query_rows(sql),
            Statement::Slice { offset, limit } => {
                let sql = format!(
                    "SELECT * FROM {} LIMIT {} OFFSET {}",
                    self.read_source(),
                    limit,
                    offset
                );
                self.query_rows(&sql)
            }
        }
    }

    fn dispose(&self) {
        if let Some(conn) = self.conn.lock().take() {
            if let Err((_, e)) = conn.close() {
                warn!("Failed to close DuckDB connection: {}", e);
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
