//! Backend variants

pub mod duckdb_backend;
pub mod parquet_backend;

pub use duckdb_backend::DuckDbBackend;
pub use parquet_backend::ParquetFileBackend;
