//! SQL statement builders for the embedded engine

use arrow::datatypes::{DataType, Schema};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use pqv_core::types::{Row, SortDirection, SortSpec};
use pqv_core::DataError;

/// Base-table reference user queries must contain
static FROM_DATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFROM\s+data\b").unwrap());

/// Replace the first `FROM data` reference with a `read_parquet` scan of
/// the backing file. A query without the reference is rejected before it
/// ever reaches the engine.
pub fn rewrite_base_table(query: &str, file_path: &str) -> Result<String, DataError> {
    if !FROM_DATA.is_match(query) {
        return Err(DataError::Validation(
            "Query string must contain 'FROM data'".to_string(),
        ));
    }
    let scan = format!("FROM read_parquet('{}')", escape_literal(file_path));
    Ok(FROM_DATA.replace(query, NoExpand(&scan)).into_owned())
}

/// Escape a string literal for embedding in single quotes
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A searchable column and whether it is already text-typed
#[derive(Debug, Clone)]
pub struct SearchColumn {
    pub name: String,
    pub is_text: bool,
}

/// Columns eligible for substring search, from an arrow schema
pub fn search_columns_from_schema(schema: &Schema) -> Vec<SearchColumn> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let is_text = match field.data_type() {
                DataType::Utf8 | DataType::LargeUtf8 => true,
                DataType::Dictionary(_, value) => {
                    matches!(value.as_ref(), DataType::Utf8 | DataType::LargeUtf8)
                }
                _ => false,
            };
            SearchColumn {
                name: field.name().clone(),
                is_text,
            }
        })
        .collect()
}

/// Columns eligible for substring search, from DESCRIBE output rows
pub fn search_columns_from_describe(rows: &[Row]) -> Vec<SearchColumn> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get("column_name")?.as_str()?.to_string();
            let is_text = row
                .get("column_type")
                .and_then(|v| v.as_str())
                .map(|t| t.starts_with("VARCHAR"))
                .unwrap_or(false);
            Some(SearchColumn { name, is_text })
        })
        .collect()
}

/// OR-ed per-column `LIKE '%term%'` predicates; non-text columns are cast
/// to text first. Returns `None` when there is nothing to filter on.
pub fn search_clause(columns: &[SearchColumn], term: &str) -> Option<String> {
    if term.is_empty() || columns.is_empty() {
        return None;
    }
    let escaped = escape_literal(term);
    let predicates: Vec<String> = columns
        .iter()
        .map(|col| {
            if col.is_text {
                format!("{} LIKE '%{}%'", quote_ident(&col.name), escaped)
            } else {
                format!("CAST({} AS VARCHAR) LIKE '%{}%'", quote_ident(&col.name), escaped)
            }
        })
        .collect();
    Some(predicates.join(" OR "))
}

pub fn order_by_clause(sort: &SortSpec) -> String {
    let direction = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    format!("ORDER BY {} {}", quote_ident(&sort.field), direction)
}

/// `SELECT *` over `source` with optional search filter and sort applied
pub fn filtered_statement(
    source: &str,
    columns: &[SearchColumn],
    search: Option<&str>,
    sort: Option<&SortSpec>,
) -> String {
    let mut statement = format!("SELECT * FROM {}", source);
    if let Some(clause) = search.and_then(|term| search_clause(columns, term)) {
        statement.push_str(&format!(" WHERE ({})", clause));
    }
    if let Some(sort) = sort {
        statement.push_str(&format!(" {}", order_by_clause(sort)));
    }
    statement
}

/// One page of the filtered statement
pub fn page_statement(
    source: &str,
    columns: &[SearchColumn],
    search: Option<&str>,
    sort: Option<&SortSpec>,
    limit: usize,
    offset: usize,
) -> String {
    format!(
        "{} LIMIT {} OFFSET {}",
        filtered_statement(source, columns, search, sort),
        limit,
        offset
    )
}

/// Row count of the filtered statement
pub fn count_statement(source: &str, columns: &[SearchColumn], search: Option<&str>) -> String {
    let mut statement = format!("SELECT COUNT(*) AS count FROM {}", source);
    if let Some(clause) = search.and_then(|term| search_clause(columns, term)) {
        statement.push_str(&format!(" WHERE ({})", clause));
    }
    statement
}
