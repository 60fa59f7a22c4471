//! Core contracts for the parquet viewer
//!
//! This crate provides the backend and pagination abstractions shared by
//! the data layer and the application shell, plus the message protocol the
//! query worker speaks.

pub mod backend;
pub mod paginator;
pub mod protocol;
pub mod settings;
pub mod types;

use arrow::error::ArrowError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-export commonly used types
pub use backend::{Backend, ColumnDescriptor, MetadataEntry, Statement};
pub use paginator::{Page, PageFetcher, PageQuery, Paginator};
pub use settings::{BackendChoice, ViewerSettings};
pub use types::{
    DateTimeFormat, DateTimeFormatSettings, ExportFormat, Row, SortDirection, SortSpec,
};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("{0}")]
    Boundary(String),

    #[error("Page {page} is out of range (total pages: {pages})")]
    PageOutOfRange { page: usize, pages: usize },

    #[error("Export error: {0}")]
    Export(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}
