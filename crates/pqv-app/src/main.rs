//! Command line parquet viewer

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use pqv_core::paginator::PageQuery;
use pqv_core::settings::{BackendChoice, ViewerSettings};
use pqv_core::types::{ExportFormat, SortDirection, SortSpec};

mod document;

use document::Document;

#[derive(Parser)]
#[command(name = "pqv", about = "Inspect, query and export parquet files")]
struct Cli {
    /// Parquet file to open
    file: PathBuf,
    /// Settings file (JSON); built-in defaults apply when absent
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,
    /// Backend override: duckdb or parquet
    #[arg(long, value_parser = parse_backend)]
    backend: Option<BackendChoice>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the per-column schema
    Schema,
    /// Print file-level metadata
    Meta,
    /// Print one page of rows straight from the file
    Page(PageArgs),
    /// Run a SQL query against the file and print its first page
    Query(QueryArgs),
    /// Run a query, then search within its result
    Search(SearchArgs),
    /// Run a query and export its full result to a file
    Export(ExportArgs),
}

#[derive(Args)]
struct PageArgs {
    /// Page number to jump to (default: the current page)
    #[arg(long)]
    page: Option<usize>,
    /// Rows per page, or "all"
    #[arg(long, value_name = "N|all")]
    page_size: Option<String>,
    /// Sort by "column" or "column:desc" (DuckDB backend only)
    #[arg(long, value_parser = parse_sort)]
    sort: Option<SortSpec>,
    /// Keep only rows containing this text (DuckDB backend only)
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    /// SQL with a FROM data clause (default: the settings' default query)
    sql: Option<String>,
    /// Rows per page, or "all"
    #[arg(long, value_name = "N|all")]
    page_size: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Text to look for across all columns
    term: String,
    /// Query to materialize first (default: the settings' default query)
    #[arg(long)]
    query: Option<String>,
    /// Sort by "column" or "column:desc"
    #[arg(long, value_parser = parse_sort)]
    sort: Option<SortSpec>,
    /// Rows per page, or "all"
    #[arg(long, value_name = "N|all")]
    page_size: Option<String>,
}

#[derive(Args)]
struct ExportArgs {
    /// Output format: csv, json, ndjson, parquet or excel
    format: ExportFormat,
    /// Destination path (default: next to the source file)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Query to materialize first (default: the settings' default query)
    #[arg(long)]
    query: Option<String>,
    /// Export only rows containing this text
    #[arg(long)]
    search: Option<String>,
    /// Sort by "column" or "column:desc"
    #[arg(long, value_parser = parse_sort)]
    sort: Option<SortSpec>,
}

fn parse_backend(value: &str) -> Result<BackendChoice, String> {
    match value.to_ascii_lowercase().as_str() {
        "duckdb" => Ok(BackendChoice::Duckdb),
        "parquet" => Ok(BackendChoice::Parquet),
        other => Err(format!(
            "unknown backend '{}', expected duckdb or parquet",
            other
        )),
    }
}

fn parse_sort(value: &str) -> Result<SortSpec, String> {
    let (field, direction) = match value.rsplit_once(':') {
        Some((field, dir)) => {
            let direction = match dir.to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Ascending,
                "desc" => SortDirection::Descending,
                other => {
                    return Err(format!(
                        "unknown sort direction '{}', expected asc or desc",
                        other
                    ))
                }
            };
            (field, direction)
        }
        None => (value, SortDirection::Ascending),
    };
    if field.is_empty() {
        return Err("sort column name is empty".to_string());
    }
    Ok(SortSpec {
        field: field.to_string(),
        direction,
    })
}

/// Resolve a `--page-size` argument; "all" means one page with every row.
fn resolve_page_size(
    arg: Option<&str>,
    settings: &ViewerSettings,
    total: usize,
) -> Result<usize> {
    let fallback = settings.default_page_sizes.first().copied().unwrap_or(20);
    match arg {
        None => Ok(fallback),
        Some("all") => Ok(total.max(1)),
        Some(text) => {
            let size = text
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("invalid page size '{}': {}", text, e))?;
            if size == 0 {
                anyhow::bail!("page size must be greater than zero");
            }
            Ok(size)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.settings {
        Some(path) => ViewerSettings::load(path)?,
        None => ViewerSettings::default(),
    };
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }

    let mut document = Document::open(&cli.file, &settings).await?;
    if let Some(reason) = document.fallback_reason() {
        eprintln!("SQL features are unavailable: {}", reason);
    }

    match cli.command {
        Command::Schema => print_json(&document.schema())?,
        Command::Meta => print_json(&document.metadata())?,
        Command::Page(args) => {
            let page_size =
                resolve_page_size(args.page_size.as_deref(), &settings, document.row_count())?;
            let query = PageQuery {
                page_size,
                page_number: args.page,
                sort: args.sort,
                search: args.search,
            };
            let page = document.browse_page(&query).await?;
            print_json(&page)?;
        }
        Command::Query(args) => {
            let page_size =
                resolve_page_size(args.page_size.as_deref(), &settings, document.row_count())?;
            let sql = args.sql.unwrap_or_else(|| settings.default_query.clone());
            let response = document.worker()?.query(sql, page_size).await?;
            print_json(&response)?;
        }
        Command::Search(args) => {
            let page_size =
                resolve_page_size(args.page_size.as_deref(), &settings, document.row_count())?;
            let sql = args.query.unwrap_or_else(|| settings.default_query.clone());
            let worker = document.worker()?;
            worker.query(sql, page_size).await?;
            let response = worker.search(args.term, args.sort, page_size).await?;
            print_json(&response)?;
        }
        Command::Export(args) => {
            let sql = args.query.unwrap_or_else(|| settings.default_query.clone());
            let output = args
                .output
                .unwrap_or_else(|| document.default_export_path(args.format));
            let page_size = settings.default_page_sizes.first().copied().unwrap_or(20);
            let worker = document.worker()?;
            worker.query(sql, page_size).await?;
            let response = worker
                .export(args.format, output, args.search, args.sort)
                .await?;
            print_json(&response)?;
        }
    }

    document.close();
    Ok(())
}
