//! One open parquet file: its backend, a browse paginator and the query worker

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use pqv_core::backend::{Backend, ColumnDescriptor, MetadataEntry};
use pqv_core::paginator::{Page, PageQuery, Paginator};
use pqv_core::settings::{BackendChoice, ViewerSettings};
use pqv_core::types::{DateTimeFormatSettings, ExportFormat};
use pqv_core::DataError;
use pqv_data::backends::{DuckDbBackend, ParquetFileBackend};
use pqv_data::paginate::{DuckDbPageFetcher, ParquetPageFetcher};
use pqv_data::worker::{self, WorkerHandle};

/// An open file together with the handles that serve reads from it.
///
/// The DuckDB backend brings a query worker with it; the direct parquet
/// backend only supports browsing, so `worker` stays empty there.
pub struct Document {
    path: PathBuf,
    backend: Arc<dyn Backend>,
    paginator: Paginator,
    worker: Option<WorkerHandle>,
    fallback_reason: Option<String>,
}

impl Document {
    /// Open `path` with the backend named by `settings`.
    ///
    /// When DuckDB fails to initialize, the file is reopened with the
    /// direct parquet reader and the failure is kept as `fallback_reason`.
    pub async fn open(path: &Path, settings: &ViewerSettings) -> Result<Self, DataError> {
        let datetime_format = settings.datetime_format_settings();
        let mut fallback_reason = None;

        if settings.backend == BackendChoice::Duckdb {
            match Self::open_duckdb(path, datetime_format.clone()).await {
                Ok(document) => return Ok(document),
                Err(e) => {
                    warn!(
                        "DuckDB backend failed for {}, falling back to the parquet reader: {}",
                        path.display(),
                        e
                    );
                    fallback_reason = Some(e.to_string());
                }
            }
        }

        let mut document = Self::open_parquet(path, datetime_format).await?;
        document.fallback_reason = fallback_reason;
        Ok(document)
    }

    async fn open_duckdb(
        path: &Path,
        datetime_format: DateTimeFormatSettings,
    ) -> Result<Self, DataError> {
        let mut backend = DuckDbBackend::new(path, datetime_format.clone())?;
        backend.initialize().await?;
        let backend = Arc::new(backend);

        let fetcher = DuckDbPageFetcher::for_file(Arc::clone(&backend));
        let paginator = Paginator::new(Box::new(fetcher), backend.row_count());
        let worker = worker::spawn(path.to_path_buf(), datetime_format).await?;
        info!("Opened {} with the DuckDB backend", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            backend,
            paginator,
            worker: Some(worker),
            fallback_reason: None,
        })
    }

    async fn open_parquet(
        path: &Path,
        datetime_format: DateTimeFormatSettings,
    ) -> Result<Self, DataError> {
        let mut backend = ParquetFileBackend::new(path, datetime_format);
        backend.initialize().await?;
        let backend = Arc::new(backend);

        let fetcher = ParquetPageFetcher::new(Arc::clone(&backend));
        let paginator = Paginator::new(Box::new(fetcher), backend.row_count());
        info!("Opened {} with the parquet reader", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            backend,
            paginator,
            worker: None,
            fallback_reason: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> Vec<ColumnDescriptor> {
        self.backend.schema()
    }

    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.backend.metadata()
    }

    pub fn row_count(&self) -> usize {
        self.backend.row_count()
    }

    /// Why SQL is unavailable, if the DuckDB backend could not open the file
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn has_sql(&self) -> bool {
        self.worker.is_some()
    }

    /// The query worker, or a `Query` error on the SQL-less backend
    pub fn worker(&self) -> Result<&WorkerHandle, DataError> {
        self.worker.as_ref().ok_or_else(|| {
            DataError::Query(
                "SQL statements are not supported by the parquet-file backend".to_string(),
            )
        })
    }

    /// Fetch a browse page straight from the file, without running a query.
    ///
    /// `query.page_number` jumps to that page; when absent the current page
    /// is refetched, rescaled if the page size changed.
    pub async fn browse_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        if query.page_number.is_some() {
            self.paginator.goto_page(query).await
        } else {
            self.paginator.get_current_page(query).await
        }
    }

    /// Suggested export destination: the source directory, with a
    /// `<stem>-<timestamp>.<ext>` file name
    pub fn default_export_path(&self, format: ExportFormat) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        self.path
            .with_file_name(format!("{}-{}.{}", stem, stamp, format.extension()))
    }

    /// Shut the worker down and release the backend. Safe to call twice.
    pub fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.exit();
        }
        self.backend.dispose();
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.close();
    }
}
