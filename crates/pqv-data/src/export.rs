//! COPY-based export of a query result to a file

use std::path::Path;

use tracing::debug;

use pqv_core::types::ExportFormat;
use pqv_core::DataError;

use crate::backends::duckdb_backend::{DuckDbBackend, SPATIAL_SETUP};
use crate::sql::{escape_literal, quote_ident};

fn copy_options(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "WITH (HEADER, DELIMITER ',')",
        ExportFormat::Json => "WITH (FORMAT JSON, ARRAY true)",
        ExportFormat::Ndjson => "WITH (FORMAT JSON)",
        ExportFormat::Parquet => "WITH (FORMAT PARQUET)",
        ExportFormat::Excel => "WITH (FORMAT GDAL, DRIVER 'xlsx')",
    }
}

/// The COPY statement writing `source` (a SELECT) to `path`
pub fn copy_statement(source: &str, format: ExportFormat, path: &str) -> String {
    format!(
        "COPY ({}) TO '{}' {}",
        source,
        escape_literal(path),
        copy_options(format)
    )
}

/// Export `source` to `path`. For spreadsheets, struct- and map-typed
/// columns are flattened to JSON strings first since the xlsx driver
/// cannot represent nesting.
pub fn copy_to_file(
    backend: &DuckDbBackend,
    source: &str,
    format: ExportFormat,
    path: &Path,
) -> Result<(), DataError> {
    let source = match format {
        ExportFormat::Excel => {
            backend.execute_sql(SPATIAL_SETUP).map_err(|e| {
                DataError::Export(format!("Spreadsheet export needs the spatial extension: {}", e))
            })?;
            prepare_excel_destination(path)?;
            flatten_nested_columns(backend, source).map_err(export_error)?
        }
        _ => source.to_string(),
    };

    let statement = copy_statement(&source, format, &path.to_string_lossy());
    debug!(statement, "export copy");
    backend.execute_sql(&statement).map_err(export_error)
}

/// Wrap `source` in a SELECT that casts nested columns to JSON text;
/// returns `source` unchanged when nothing is nested
fn flatten_nested_columns(backend: &DuckDbBackend, source: &str) -> Result<String, DataError> {
    let rows = backend.query_rows(&format!("DESCRIBE {}", source))?;
    let mut exprs = Vec::with_capacity(rows.len());
    let mut nested = false;
    for row in &rows {
        let name = match row.get("column_name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => continue,
        };
        let column_type = row
            .get("column_type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if column_type.starts_with("STRUCT") || column_type.starts_with("MAP") {
            nested = true;
            let ident = quote_ident(name);
            exprs.push(format!("CAST(to_json({}) AS VARCHAR) AS {}", ident, ident));
        } else {
            exprs.push(quote_ident(name));
        }
    }
    if nested {
        Ok(format!("SELECT {} FROM ({})", exprs.join(", "), source))
    } else {
        Ok(source.to_string())
    }
}

/// The GDAL xlsx driver on Windows refuses to write unless the
/// destination and its `tmp_`-prefixed sibling already exist as workbooks
#[cfg(windows)]
fn prepare_excel_destination(path: &Path) -> Result<(), DataError> {
    use rust_xlsxwriter::Workbook;

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let sibling = path.with_file_name(format!("tmp_{}", file_name));
    for target in [path, sibling.as_path()] {
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        workbook
            .save(target)
            .map_err(|e| DataError::Export(format!("Failed to pre-create workbook: {}", e)))?;
    }
    Ok(())
}

#[cfg(not(windows))]
fn prepare_excel_destination(_path: &Path) -> Result<(), DataError> {
    Ok(())
}

/// Engine failures during COPY surface as export errors
fn export_error(e: DataError) -> DataError {
    match e {
        DataError::Query(message) => DataError::Export(message),
        other => other,
    }
}
