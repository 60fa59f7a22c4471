//! Query worker running on its own thread with its own engine instance

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use pqv_core::backend::Backend;
use pqv_core::paginator::{PageQuery, Paginator};
use pqv_core::protocol::{ExportResponse, PageAction, PageResponse, QueryResponse, WorkerRequest};
use pqv_core::types::{DateTimeFormatSettings, ExportFormat, Row, SortSpec};
use pqv_core::DataError;

use crate::backends::DuckDbBackend;
use crate::export::copy_to_file;
use crate::paginate::DuckDbPageFetcher;
use crate::sql;

/// Name of the materialized result table inside the worker's engine
pub const QUERY_RESULT_TABLE: &str = "query_result";

/// Spawn the worker thread and wait until its engine is initialized.
///
/// The worker opens a second, independent engine instance on the same
/// file; its row counts may diverge from the browse path if the file
/// changes on disk in between.
pub async fn spawn(
    path: PathBuf,
    datetime_format: DateTimeFormatSettings,
) -> Result<WorkerHandle, DataError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let stop = Arc::new(AtomicBool::new(false));

    let worker_stop = Arc::clone(&stop);
    let thread = std::thread::Builder::new()
        .name("pqv-query-worker".to_string())
        .spawn(move || worker_main(path, datetime_format, rx, ready_tx, worker_stop))
        .map_err(|e| DataError::Worker(format!("Failed to spawn worker thread: {}", e)))?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(WorkerHandle {
            tx,
            stop,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(DataError::Worker(
                "Worker thread exited before becoming ready".to_string(),
            ))
        }
    }
}

/// Foreground handle to the worker; dropping it stops the thread
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerRequest>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub async fn query(
        &self,
        query: impl Into<String>,
        page_size: usize,
    ) -> Result<QueryResponse, DataError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Query {
                query: query.into(),
                page_size,
                reply,
            })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    pub async fn search(
        &self,
        search: impl Into<String>,
        sort: Option<SortSpec>,
        page_size: usize,
    ) -> Result<PageResponse, DataError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Search {
                search: search.into(),
                sort,
                page_size,
                reply,
            })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    pub async fn page(
        &self,
        action: PageAction,
        query: PageQuery,
    ) -> Result<PageResponse, DataError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Page {
                action,
                query,
                reply,
            })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        path: PathBuf,
        search: Option<String>,
        sort: Option<SortSpec>,
    ) -> Result<ExportResponse, DataError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Export {
                format,
                path,
                search,
                sort,
                reply,
            })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    /// Stop the worker after its current operation; queued requests are
    /// abandoned, not drained
    pub fn exit(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::Release);
            let _ = self.tx.send(WorkerRequest::Exit);
            if thread.join().is_err() {
                error!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.exit();
    }
}

fn worker_gone() -> DataError {
    DataError::Worker("Worker is not running".to_string())
}

fn no_query_result() -> DataError {
    DataError::Validation("No query result; run a query first".to_string())
}

fn worker_main(
    path: PathBuf,
    datetime_format: DateTimeFormatSettings,
    mut rx: mpsc::UnboundedReceiver<WorkerRequest>,
    ready: oneshot::Sender<Result<(), DataError>>,
    stop: Arc<AtomicBool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(DataError::Worker(format!(
                "Failed to build worker runtime: {}",
                e
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        let mut worker = match QueryWorker::create(path, datetime_format).await {
            Ok(worker) => worker,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        info!("query worker ready");

        while let Some(request) = rx.recv().await {
            if stop.load(Ordering::Acquire) {
                break;
            }
            match request {
                WorkerRequest::Exit => break,
                request => worker.handle(request).await,
            }
        }

        worker.backend.dispose();
        info!("query worker stopped");
    });
}

/// Per-query state kept between worker requests
struct ResultState {
    paginator: Paginator,
    columns: Vec<sql::SearchColumn>,
    schema_rows: Vec<Row>,
    row_count: usize,
}

struct QueryWorker {
    backend: Arc<DuckDbBackend>,
    result: Option<ResultState>,
}

impl QueryWorker {
    async fn create(
        path: PathBuf,
        datetime_format: DateTimeFormatSettings,
    ) -> Result<Self, DataError> {
        let mut backend = DuckDbBackend::new(path, datetime_format)?;
        backend.initialize().await?;
        Ok(Self {
            backend: Arc::new(backend),
            result: None,
        })
    }

    async fn handle(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::Query {
                query,
                page_size,
                reply,
            } => {
                let _ = reply.send(self.run_query(&query, page_size).await);
            }
            WorkerRequest::Search {
                search,
                sort,
                page_size,
                reply,
            } => {
                let _ = reply.send(self.run_search(&search, sort, page_size).await);
            }
            WorkerRequest::Page {
                action,
                query,
                reply,
            } => {
                let _ = reply.send(self.run_page(action, &query).await);
            }
            WorkerRequest::Export {
                format,
                path,
                search,
                sort,
                reply,
            } => {
                let _ = reply.send(self.run_export(format, &path, search, sort));
            }
            WorkerRequest::Exit => {}
        }
    }

    async fn run_query(
        &mut self,
        query: &str,
        page_size: usize,
    ) -> Result<QueryResponse, DataError> {
        let rewritten =
            sql::rewrite_base_table(query, &self.backend.path().to_string_lossy())?;

        self.backend
            .execute_sql(&format!("DROP TABLE IF EXISTS {}", QUERY_RESULT_TABLE))?;
        if let Err(e) = self
            .backend
            .execute_sql(&format!("CREATE TABLE {} AS {}", QUERY_RESULT_TABLE, rewritten))
        {
            // The old table is already dropped at this point, so any prior
            // result state is unusable
            self.result = None;
            return Err(e);
        }

        let row_count = self
            .backend
            .query_count(&format!("SELECT COUNT(*) AS count FROM {}", QUERY_RESULT_TABLE))?;
        let schema_rows = self.backend.query_rows(&format!("DESCRIBE {}", rewritten))?;
        let columns = sql::search_columns_from_describe(&schema_rows);

        let fetcher = DuckDbPageFetcher::for_table(
            Arc::clone(&self.backend),
            QUERY_RESULT_TABLE,
            columns.clone(),
        );
        let mut paginator = Paginator::new(Box::new(fetcher), row_count);
        let page = paginator.first_page(&PageQuery::sized(page_size)).await?;

        let rows = sanitize_rows(page.rows);
        let headers = headers_from_rows(&rows, &schema_rows);
        let response = QueryResponse {
            headers,
            rows,
            schema: schema_rows.clone(),
            row_count,
            page_number: page.page_number,
            page_count: page.page_count,
            page_size: page.page_size,
        };
        self.result = Some(ResultState {
            paginator,
            columns,
            schema_rows,
            row_count,
        });
        Ok(response)
    }

    async fn run_search(
        &mut self,
        search: &str,
        sort: Option<SortSpec>,
        page_size: usize,
    ) -> Result<PageResponse, DataError> {
        let state = self.result.as_mut().ok_or_else(no_query_result)?;

        let search = if search.is_empty() {
            None
        } else {
            Some(search.to_string())
        };
        let count_sql =
            sql::count_statement(QUERY_RESULT_TABLE, &state.columns, search.as_deref());
        let filtered_count = self.backend.query_count(&count_sql)?;

        state.paginator.set_total_items(filtered_count);
        state.row_count = filtered_count;

        let query = PageQuery {
            page_size,
            page_number: None,
            sort,
            search,
        };
        let page = state.paginator.first_page(&query).await?;

        let rows = sanitize_rows(page.rows);
        let headers = headers_from_rows(&rows, &state.schema_rows);
        Ok(PageResponse {
            headers,
            rows,
            row_count: filtered_count,
            page_number: page.page_number,
            page_count: page.page_count,
            page_size: page.page_size,
        })
    }

    async fn run_page(
        &mut self,
        action: PageAction,
        query: &PageQuery,
    ) -> Result<PageResponse, DataError> {
        let state = self.result.as_mut().ok_or_else(no_query_result)?;
        let page = match action {
            PageAction::Next => state.paginator.next_page(query).await?,
            PageAction::Prev => state.paginator.previous_page(query).await?,
            PageAction::First => state.paginator.first_page(query).await?,
            PageAction::Last => state.paginator.last_page(query).await?,
            PageAction::Current => state.paginator.goto_page(query).await?,
        };

        let rows = sanitize_rows(page.rows);
        let headers = headers_from_rows(&rows, &state.schema_rows);
        Ok(PageResponse {
            headers,
            rows,
            row_count: state.row_count,
            page_number: page.page_number,
            page_count: page.page_count,
            page_size: page.page_size,
        })
    }

    fn run_export(
        &self,
        format: ExportFormat,
        path: &Path,
        search: Option<String>,
        sort: Option<SortSpec>,
    ) -> Result<ExportResponse, DataError> {
        let state = self.result.as_ref().ok_or_else(no_query_result)?;
        let search = search.filter(|s| !s.is_empty());
        let source = sql::filtered_statement(
            QUERY_RESULT_TABLE,
            &state.columns,
            search.as_deref(),
            sort.as_ref(),
        );
        copy_to_file(&self.backend, &source, format, path)?;
        info!(path = %path.display(), "exported query result");
        Ok(ExportResponse {
            path: path.to_path_buf(),
        })
    }
}

/// The downstream table widget treats dots in keys as field-path
/// separators, so response keys replace them
pub(crate) fn sanitize_key(key: &str) -> String {
    key.replace('.', "_")
}

fn sanitize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| (sanitize_key(&key), value))
                .collect()
        })
        .collect()
}

/// Headers come from the first row; an empty page falls back to the
/// cached result schema
fn headers_from_rows(rows: &[Row], schema_rows: &[Row]) -> Vec<String> {
    match rows.first() {
        Some(row) => row.keys().cloned().collect(),
        None => schema_rows
            .iter()
            .filter_map(|row| row.get("column_name").and_then(|v| v.as_str()))
            .map(sanitize_key)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_with_dots_are_sanitized() {
        let mut row = Row::new();
        row.insert("a.b".to_string(), json!(1));
        row.insert("plain".to_string(), json!(2));
        let rows = sanitize_rows(vec![row]);
        assert_eq!(rows[0].get("a_b"), Some(&json!(1)));
        assert_eq!(rows[0].get("plain"), Some(&json!(2)));
        assert!(rows[0].get("a.b").is_none());
    }

    #[test]
    fn headers_fall_back_to_schema_for_empty_pages() {
        let mut row = Row::new();
        row.insert("x".to_string(), json!(1));
        assert_eq!(headers_from_rows(&[row], &[]), vec!["x"]);

        let schema_row: Row = serde_json::from_value(
            json!({"column_name": "a.b", "column_type": "VARCHAR"}),
        )
        .unwrap();
        assert_eq!(headers_from_rows(&[], &[schema_row]), vec!["a_b"]);
    }
}
