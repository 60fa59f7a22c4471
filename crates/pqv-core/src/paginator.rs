//! Page navigation over a counted result set

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Row, SortSpec};
use crate::DataError;

/// Parameters for one page fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQuery {
    pub page_size: usize,
    #[serde(default)]
    pub page_number: Option<usize>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub search: Option<String>,
}

impl PageQuery {
    /// Plain page fetch with no filter or sort
    pub fn sized(page_size: usize) -> Self {
        Self {
            page_size,
            page_number: None,
            sort: None,
            search: None,
        }
    }
}

/// Zero-based row offset of a 1-based page
pub fn page_offset(page_number: usize, page_size: usize) -> usize {
    (page_number - 1) * page_size
}

/// Number of pages needed for `total_items`; an empty set still has one
/// (empty) page, so the cursor always has somewhere valid to sit
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    ((total_items + page_size - 1) / page_size).max(1)
}

/// Fetches one page of rows from a concrete source
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch up to `limit` rows starting at `offset`, honoring the query's
    /// search and sort where the source supports them
    async fn fetch_rows(
        &self,
        offset: usize,
        limit: usize,
        query: &PageQuery,
    ) -> Result<Vec<Row>, DataError>;
}

/// One fetched page plus its cursor bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub rows: Vec<Row>,
    pub page_number: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub total_items: usize,
}

/// 1-based page cursor over a counted result set.
///
/// `total_pages` is derived from the requested page size on every call, so
/// the page size may change between calls without invalidating the cursor.
/// Boundary violations leave the cursor untouched.
pub struct Paginator {
    fetcher: Box<dyn PageFetcher>,
    total_items: usize,
    current_page: usize,
    page_size: usize,
}

impl Paginator {
    pub fn new(fetcher: Box<dyn PageFetcher>, total_items: usize) -> Self {
        Self {
            fetcher,
            total_items,
            current_page: 1,
            page_size: 10,
        }
    }

    pub fn current_page_number(&self) -> usize {
        self.current_page
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Replace the item count after the backing set changed (e.g. a search
    /// narrowed the results)
    pub fn set_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
        let pages = total_pages(total_items, self.page_size);
        if self.current_page > pages {
            self.current_page = pages;
        }
    }

    pub fn page_count(&self, page_size: usize) -> usize {
        total_pages(self.total_items, page_size)
    }

    /// Advance one page; fails at the last page
    pub async fn next_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        let pages = total_pages(self.total_items, query.page_size);
        if self.current_page >= pages {
            return Err(DataError::Boundary("No more pages available.".to_string()));
        }
        self.current_page += 1;
        self.fetch(query).await
    }

    /// Step back one page; fails at the first page
    pub async fn previous_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        if self.current_page <= 1 {
            return Err(DataError::Boundary("Already on the first page.".to_string()));
        }
        self.current_page -= 1;
        self.fetch(query).await
    }

    pub async fn first_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        self.current_page = 1;
        self.fetch(query).await
    }

    pub async fn last_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        self.current_page = total_pages(self.total_items, query.page_size);
        self.fetch(query).await
    }

    /// Jump to `query.page_number`, or re-fetch the current page when no
    /// number is given.
    ///
    /// A requested page past the end falls back to the cursor position
    /// rescaled for the requested page size, so a page-size change never
    /// strands the cursor out of range. Page numbers below 1 are rejected.
    pub async fn goto_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        debug!(
            page = ?query.page_number,
            page_size = query.page_size,
            "goto_page"
        );
        let pages = total_pages(self.total_items, query.page_size);
        let mut target = query.page_number.unwrap_or(self.current_page);
        if target > pages {
            self.rescale(query.page_size);
            target = self.current_page;
        }
        if target < 1 {
            return Err(DataError::Boundary("Invalid page number.".to_string()));
        }
        self.current_page = target;
        self.fetch(query).await
    }

    /// Re-fetch after a page-size change, keeping the first visible row on
    /// screen
    pub async fn get_current_page(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        self.rescale(query.page_size);
        self.fetch(query).await
    }

    /// Move the cursor to the page that contains the first item of the
    /// current page under the new page size
    fn rescale(&mut self, new_page_size: usize) {
        let first_item_index = (self.current_page - 1) * self.page_size;
        self.current_page = first_item_index / new_page_size.max(1) + 1;
        self.page_size = new_page_size;
    }

    async fn fetch(&mut self, query: &PageQuery) -> Result<Page, DataError> {
        let offset = page_offset(self.current_page, query.page_size);
        let rows = self
            .fetcher
            .fetch_rows(offset, query.page_size, query)
            .await?;
        self.page_size = query.page_size;
        Ok(Page {
            rows,
            page_number: self.current_page,
            page_count: total_pages(self.total_items, query.page_size),
            page_size: query.page_size,
            total_items: self.total_items,
        })
    }
}
