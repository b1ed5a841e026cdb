//! sheetquery - query spreadsheet files with SQL.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sheetquery::logging::init_stderr_logging;
use sheetquery::Store;
use sheetquery::StoreConfig;
use sheetquery::TabularResult;
use std::path::PathBuf;
use tracing::error;
use tracing::info;

/// Load spreadsheet files as tables and query them with SQL.
#[derive(Parser, Debug)]
#[command(name = "sheetquery")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Spreadsheet files to load (.xlsx, .xlsm, .xls, .ods)
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// SQL query to run against the loaded tables
    #[arg(short, long, value_name = "SQL")]
    sql: Option<String>,

    /// Maximum number of rows returned
    #[arg(short, long, value_name = "ROWS")]
    limit: Option<usize>,

    /// Print the catalog as JSON
    #[arg(long)]
    catalog: bool,

    /// Config file path
    #[arg(long, value_name = "PATH", env = "SHEETQUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Print query results as JSON instead of a text table
    #[arg(long)]
    json: bool,
}

fn main() {
    init_stderr_logging();

    if let Err(e) = run(Cli::parse()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            StoreConfig::load_from_file(path)?
        }
        None => StoreConfig::default(),
    };

    let mut store = Store::new(config)?;
    for path in &cli.files {
        if let Err(e) = store.ingest_path(path) {
            error!("Failed to load {}: {e}", path.display());
        }
    }

    if cli.catalog {
        println!("{}", store.catalog().to_json()?);
    }

    let Some(sql) = &cli.sql else {
        if !cli.catalog {
            print_tables(&store);
        }
        return Ok(());
    };

    if store.catalog().is_empty() {
        anyhow::bail!("No tables loaded");
    }

    let limit = cli.limit.unwrap_or(store.config().default_limit);
    let result = store
        .run_query(sql, limit)
        .with_context(|| format!("SQL execution failed for: {sql}"))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result.records())?);
    } else {
        print!("{}", render_table(&result));
    }
    Ok(())
}

fn print_tables(store: &Store) {
    println!("{} table(s) available.", store.catalog().len());
    for metadata in store.catalog() {
        println!(
            "  {} - {} / {} - {} rows",
            metadata.table, metadata.file, metadata.sheet, metadata.rows
        );
    }
}

/// Left-aligned text grid with a header rule.
fn render_table(result: &TabularResult) -> String {
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|value| value.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|column| column.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |values: &mut dyn Iterator<Item = &str>| -> String {
        let padded: Vec<String> = values
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut output = line(&mut result.columns.iter().map(String::as_str));
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    output.push_str(&format!("{}\n", rule.join("-+-")));
    for row in &cells {
        output.push_str(&line(&mut row.iter().map(String::as_str)));
    }
    output.push_str(&format!("({} row{})\n", result.row_count(), if result.row_count() == 1 { "" } else { "s" }));
    output
}
