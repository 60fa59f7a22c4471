//! Shared transport and configuration types

use serde::{Deserialize, Serialize};

/// A single result row: column name to normalized value, in column order.
///
/// Values are always transport-safe: wide integers arrive as decimal
/// strings, byte arrays as arrays of numbers, and nested structs/lists as
/// JSON text.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Sort request applied to a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

/// Output formats for query-result export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Ndjson,
    Parquet,
    Excel,
}

impl ExportFormat {
    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Ndjson => "ndjson",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Excel => "xlsx",
        }
    }

    /// Human readable name, used in prompts and logs
    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "Comma Separated Values file",
            ExportFormat::Json => "JavaScript Object Notation file",
            ExportFormat::Ndjson => "Newline Delimited JSON file",
            ExportFormat::Parquet => "Parquet file",
            ExportFormat::Excel => "Microsoft Excel file",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "ndjson" => Ok(ExportFormat::Ndjson),
            "parquet" => Ok(ExportFormat::Parquet),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// How date and timestamp values are rendered.
///
/// Serialized as a plain string: the two well-known names map to their
/// variants, anything else is treated as a custom strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DateTimeFormat {
    Iso8601,
    Rfc2822,
    Custom(String),
}

impl From<String> for DateTimeFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ISO8601" => DateTimeFormat::Iso8601,
            "RFC2822" => DateTimeFormat::Rfc2822,
            _ => DateTimeFormat::Custom(value),
        }
    }
}

impl From<DateTimeFormat> for String {
    fn from(value: DateTimeFormat) -> Self {
        match value {
            DateTimeFormat::Iso8601 => "ISO8601".to_string(),
            DateTimeFormat::Rfc2822 => "RFC2822".to_string(),
            DateTimeFormat::Custom(pattern) => pattern,
        }
    }
}

/// Date/time rendering settings applied by the value normalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeFormatSettings {
    pub format: DateTimeFormat,
    pub use_utc: bool,
}

impl Default for DateTimeFormatSettings {
    fn default() -> Self {
        Self {
            format: DateTimeFormat::Iso8601,
            use_utc: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_format_from_string() {
        assert_eq!(
            DateTimeFormat::from("ISO8601".to_string()),
            DateTimeFormat::Iso8601
        );
        assert_eq!(
            DateTimeFormat::from("RFC2822".to_string()),
            DateTimeFormat::Rfc2822
        );
        assert_eq!(
            DateTimeFormat::from("%Y-%m-%d".to_string()),
            DateTimeFormat::Custom("%Y-%m-%d".to_string())
        );
    }

    #[test]
    fn datetime_format_round_trips_through_json() {
        let settings = DateTimeFormatSettings {
            format: DateTimeFormat::Custom("%d/%m/%Y".to_string()),
            use_utc: true,
        };
        let text = serde_json::to_string(&settings).unwrap();
        let parsed: DateTimeFormatSettings = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn export_format_parses_aliases() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!("Excel".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert!("tsv".parse::<ExportFormat>().is_err());
    }
}
