//! Parquet file access: backends, page fetchers, the query worker, and export

pub mod backends;
pub mod export;
pub mod normalize;
pub mod paginate;
pub mod sql;
pub mod worker;

// Re-exports
pub use backends::{DuckDbBackend, ParquetFileBackend};
pub use paginate::{DuckDbPageFetcher, ParquetPageFetcher};
pub use worker::WorkerHandle;
