//! Page fetchers bridging the paginator to the two backends

use std::sync::Arc;

use async_trait::async_trait;

use pqv_core::backend::{Backend, Statement};
use pqv_core::paginator::{total_pages, PageFetcher, PageQuery};
use pqv_core::types::Row;
use pqv_core::DataError;

use crate::backends::{DuckDbBackend, ParquetFileBackend};
use crate::sql::{page_statement, search_columns_from_schema, SearchColumn};

/// Fetches pages through the embedded engine, from the backing file or
/// from a materialized table
pub struct DuckDbPageFetcher {
    backend: Arc<DuckDbBackend>,
    source: String,
    columns: Vec<SearchColumn>,
}

impl DuckDbPageFetcher {
    /// Page over the backing file itself. The backend must be initialized.
    pub fn for_file(backend: Arc<DuckDbBackend>) -> Self {
        let source = backend.read_source();
        let columns = search_columns_from_schema(&backend.arrow_schema());
        Self {
            backend,
            source,
            columns,
        }
    }

    /// Page over a table inside the engine
    pub fn for_table(
        backend: Arc<DuckDbBackend>,
        table: &str,
        columns: Vec<SearchColumn>,
    ) -> Self {
        Self {
            backend,
            source: table.to_string(),
            columns,
        }
    }
}

#[async_trait]
impl PageFetcher for DuckDbPageFetcher {
    async fn fetch_rows(
        &self,
        offset: usize,
        limit: usize,
        query: &PageQuery,
    ) -> Result<Vec<Row>, DataError> {
        let sql = page_statement(
            &self.source,
            &self.columns,
            query.search.as_deref(),
            query.sort.as_ref(),
            limit,
            offset,
        );
        self.backend.query_rows(&sql)
    }
}

/// Fetches row windows by scanning the file; search and sort are ignored
/// since there is no engine to evaluate them
pub struct ParquetPageFetcher {
    backend: Arc<ParquetFileBackend>,
}

impl ParquetPageFetcher {
    pub fn new(backend: Arc<ParquetFileBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PageFetcher for ParquetPageFetcher {
    async fn fetch_rows(
        &self,
        offset: usize,
        limit: usize,
        _query: &PageQuery,
    ) -> Result<Vec<Row>, DataError> {
        let total = self.backend.row_count();
        // Page 1 of an empty file is still served (as an empty page)
        if offset > 0 && offset >= total {
            return Err(DataError::PageOutOfRange {
                page: offset / limit.max(1) + 1,
                pages: total_pages(total, limit.max(1)),
            });
        }
        self.backend.query(&Statement::Slice { offset, limit }).await
    }
}
