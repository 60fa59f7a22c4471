//! Viewer settings loaded from an optional JSON file

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{DateTimeFormat, DateTimeFormatSettings};
use crate::DataError;

/// Which backend opens a file first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// DuckDB with full SQL support
    Duckdb,
    /// Direct parquet reads, no SQL
    Parquet,
}

/// User-tunable viewer settings; every field has a sensible default so a
/// settings file may specify only what it overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub backend: BackendChoice,
    pub default_page_sizes: Vec<usize>,
    pub default_query: String,
    pub date_time_format: DateTimeFormat,
    pub output_date_time_format_in_utc: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Duckdb,
            default_page_sizes: vec![20, 50, 100, 500],
            default_query: "SELECT *\nFROM data\nLIMIT 1000;".to_string(),
            date_time_format: DateTimeFormat::Iso8601,
            output_date_time_format_in_utc: false,
        }
    }
}

impl ViewerSettings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| DataError::Other(format!("Failed to parse settings file: {}", e)))
    }

    /// The datetime rendering options carried by these settings
    pub fn datetime_format_settings(&self) -> DateTimeFormatSettings {
        DateTimeFormatSettings {
            format: self.date_time_format.clone(),
            use_utc: self.output_date_time_format_in_utc,
        }
    }
}
