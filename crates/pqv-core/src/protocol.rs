//! Request and response types for the query worker

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::paginator::PageQuery;
use crate::types::{ExportFormat, Row, SortSpec};
use crate::DataError;

/// Navigation verb for a paged result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    Next,
    Prev,
    First,
    Last,
    /// Re-fetch the current page (after a page-size change or a goto)
    Current,
}

/// Result of running a query and fetching its first page
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    /// One row per column, as reported by DESCRIBE
    pub schema: Vec<Row>,
    pub row_count: usize,
    pub page_number: usize,
    pub page_count: usize,
    pub page_size: usize,
}

/// Result of a navigation or search request
#[derive(Debug, Clone, Serialize)]
pub struct PageResponse {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub page_number: usize,
    pub page_count: usize,
    pub page_size: usize,
}

/// Result of exporting the current query result to a file
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub path: PathBuf,
}

/// Messages accepted by the query worker
pub enum WorkerRequest {
    /// Run a user query against the file and return its first page
    Query {
        query: String,
        page_size: usize,
        reply: oneshot::Sender<Result<QueryResponse, DataError>>,
    },
    /// Filter the current result set; an empty term clears the filter
    Search {
        search: String,
        sort: Option<SortSpec>,
        page_size: usize,
        reply: oneshot::Sender<Result<PageResponse, DataError>>,
    },
    /// Navigate within the current result set
    Page {
        action: PageAction,
        query: PageQuery,
        reply: oneshot::Sender<Result<PageResponse, DataError>>,
    },
    /// Write the current result set (with filter and sort applied) to a file
    Export {
        format: ExportFormat,
        path: PathBuf,
        search: Option<String>,
        sort: Option<SortSpec>,
        reply: oneshot::Sender<Result<ExportResponse, DataError>>,
    },
    /// Shut the worker down
    Exit,
}
