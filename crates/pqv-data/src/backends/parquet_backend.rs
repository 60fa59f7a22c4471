//! Direct parquet reader backend, used when the embedded engine is
//! unavailable or switched off

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::task::spawn_blocking;

use pqv_core::backend::{Backend, ColumnDescriptor, MetadataEntry, Statement};
use pqv_core::types::{DateTimeFormatSettings, Row};
use pqv_core::DataError;

use crate::normalize::batch_to_rows;

struct FileDetails {
    schema: SchemaRef,
    metadata: Vec<MetadataEntry>,
    row_count: usize,
}

/// Backend that scans the file with the parquet record batch reader.
///
/// Row windows are served by a sequential scan; `Sql` statements are
/// rejected since there is no engine behind this variant.
pub struct ParquetFileBackend {
    path: PathBuf,
    datetime_format: DateTimeFormatSettings,
    schema: Option<SchemaRef>,
    metadata: Option<Vec<MetadataEntry>>,
    row_count: usize,
    disposed: AtomicBool,
}

impl ParquetFileBackend {
    pub fn new(path: impl Into<PathBuf>, datetime_format: DateTimeFormatSettings) -> Self {
        Self {
            path: path.into(),
            datetime_format,
            schema: None,
            metadata: None,
            row_count: 0,
            disposed: AtomicBool::new(false),
        }
    }
}

fn read_file_details(path: &Path) -> Result<FileDetails, DataError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DataError::Initialization(format!("Failed to open parquet file: {}", e)))?;
    let schema = builder.schema().clone();
    let num_row_groups = builder.metadata().num_row_groups();
    let file_meta = builder.metadata().file_metadata();
    let num_rows = file_meta.num_rows();
    let metadata = vec![
        MetadataEntry::new("file_name", path.to_string_lossy().into_owned()),
        MetadataEntry::new("created_by", file_meta.created_by().unwrap_or_default()),
        MetadataEntry::new("num_rows", num_rows),
        MetadataEntry::new("num_row_groups", num_row_groups as i64),
        MetadataEntry::new("format_version", i64::from(file_meta.version())),
        // The reader does not expose these; keep the key set identical to
        // the engine-backed variant
        MetadataEntry::new("encryption_algorithm", ""),
        MetadataEntry::new("footer_signing_key_metadata", ""),
    ];
    Ok(FileDetails {
        schema,
        metadata,
        row_count: num_rows.max(0) as usize,
    })
}

/// Stream batches sequentially and keep the rows inside the window
fn read_slice(
    path: &Path,
    offset: usize,
    limit: usize,
    fmt: &DateTimeFormatSettings,
) -> Result<Vec<Row>, DataError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DataError::Query(e.to_string()))?
        .with_batch_size(limit.clamp(1, 8192))
        .build()
        .map_err(|e| DataError::Query(e.to_string()))?;

    let end = offset + limit;
    let mut rows = Vec::with_capacity(limit);
    let mut seen = 0usize;
    for batch in reader {
        let batch = batch?;
        let batch_start = seen;
        seen += batch.num_rows();
        if seen <= offset {
            continue;
        }
        let start_in_batch = offset.saturating_sub(batch_start);
        let end_in_batch = (end - batch_start).min(batch.num_rows());
        let window = batch.slice(start_in_batch, end_in_batch - start_in_batch);
        rows.extend(batch_to_rows(&window, fmt)?);
        if seen >= end {
            break;
        }
    }
    Ok(rows)
}

#[async_trait]
impl Backend for ParquetFileBackend {
    async fn initialize(&mut self) -> Result<(), DataError> {
        let path = self.path.clone();
        let details = spawn_blocking(move || read_file_details(&path)).await??;
        self.schema = Some(details.schema);
        self.metadata = Some(details.metadata);
        self.row_count = details.row_count;
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
        if self.disposed.load(Ordering::Acquire) {
            return Err(DataError::Query("Backend is disposed".to_string()));
        }
        match statement {
            Statement::Sql(_) => Err(DataError::Query(
                "SQL statements are not supported by the parquet-file backend".to_string(),
            )),
            Statement::Slice { offset, limit } => {
                let path = self.path.clone();
                let fmt = self.datetime_format.clone();
                let (offset, limit) = (*offset, *limit);
                spawn_blocking(move || read_slice(&path, offset, limit, &fmt)).await?
            }
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
