//! Session-scoped registry of uploaded spreadsheets.
//!
//! A [`Store`] owns a private in-memory DuckDB connection together with the
//! [`Catalog`] describing every table registered on it. Each sheet of an
//! upload becomes one table. Tables are only ever added: identifiers never
//! change meaning for the lifetime of the store.

use crate::catalog::Catalog;
use crate::catalog::TableMetadata;
use crate::config::StoreConfig;
use crate::database::naming::table_identifier;
use crate::database::naming::unique_identifier;
use crate::database::table::PhysicalColumn;
use crate::database::table::Table;
use crate::error::ParseError;
use crate::error::QueryExecutionError;
use crate::error::Result;
use crate::error::ResultMessage;
use crate::query;
use crate::query::TabularResult;
use crate::spreadsheet::read_workbook;
use duckdb::appender_params_from_iter;
use duckdb::types::Value;
use duckdb::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Tables registered from one upload, in sheet order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub file: String,
    pub tables: Vec<String>,
}

pub struct Store {
    connection: Connection,
    catalog: Catalog,
    config: StoreConfig,
}

impl Store {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        debug!("Opened in-memory engine");
        Ok(Self {
            connection,
            catalog: Catalog::new(),
            config,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(StoreConfig::default())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Registers every sheet of an upload as a table.
    ///
    /// The whole file is parsed and converted before the engine is touched,
    /// and all of its tables are created in one transaction. On error nothing
    /// from this file is registered and earlier tables are untouched.
    pub fn ingest(&mut self, file_name: &str, bytes: &[u8]) -> std::result::Result<IngestReport, ParseError> {
        let sheets = read_workbook(file_name, bytes)?;
        let tables = sheets
            .iter()
            .map(|sheet| {
                Table::from_sheet(sheet, self.config.max_name_length, self.config.max_sheet_cells)
                    .with_prefix(&format!("sheet '{}'", sheet.name))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_prefix(file_name)?;

        let identifiers = self.assign_identifiers(file_name, &tables);
        self.register(&identifiers, &tables).with_prefix(file_name)?;

        for (identifier, table) in identifiers.iter().zip(&tables) {
            let added = self.catalog.insert(TableMetadata {
                table: identifier.to_owned(),
                file: file_name.to_owned(),
                sheet: table.sheet.to_owned(),
                rows: table.rows.len(),
                cols: table.column_names(),
                dtypes: table.dtypes(),
                sample: table.sample(self.config.sample_rows),
            });
            debug_assert!(added, "identifier '{identifier}' assigned twice");
            info!("Registered '{identifier}' from {file_name} [{}] with {} row(s)", table.sheet, table.rows.len());
        }

        Ok(IngestReport {
            file: file_name.to_owned(),
            tables: identifiers,
        })
    }

    /// Reads `path` and ingests it under its file name.
    pub fn ingest_path(&mut self, path: &Path) -> std::result::Result<IngestReport, ParseError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path).map_err(ParseError::from).with_prefix(&file_name)?;
        self.ingest(&file_name, &bytes)
    }

    /// Ingests each upload independently. A failed file is reported and
    /// skipped; files before and after it still load.
    pub fn ingest_batch<N, B, I>(&mut self, files: I) -> Vec<(String, std::result::Result<IngestReport, ParseError>)>
    where
        N: Into<String>,
        B: AsRef<[u8]>,
        I: IntoIterator<Item = (N, B)>,
    {
        files
            .into_iter()
            .map(|(name, bytes)| {
                let name = name.into();
                let outcome = self.ingest(&name, bytes.as_ref());
                if let Err(e) = &outcome {
                    warn!("Skipped upload {name}: {e}");
                }
                (name, outcome)
            })
            .collect()
    }

    /// Runs `sql` with at most `limit` rows returned.
    pub fn run_query(&self, sql: &str, limit: usize) -> std::result::Result<TabularResult, QueryExecutionError> {
        query::execute(&self.connection, sql, limit, self.config.statement_guard)
    }

    pub fn run_query_default(&self, sql: &str) -> std::result::Result<TabularResult, QueryExecutionError> {
        self.run_query(sql, self.config.default_limit)
    }

    /// Picks a free identifier per table, avoiding registered tables and the
    /// ones already picked for this file.
    fn assign_identifiers(&self, file_name: &str, tables: &[Table]) -> Vec<String> {
        let max_length = self.config.max_name_length;
        let mut identifiers = Vec::<String>::with_capacity(tables.len());
        for table in tables {
            let candidate = table_identifier(file_name, &table.sheet, max_length);
            let identifier = unique_identifier(&candidate, max_length, |name| {
                self.catalog.contains(name) || identifiers.iter().any(|taken| taken == name)
            });
            identifiers.push(identifier);
        }
        identifiers
    }

    fn register(&mut self, identifiers: &[String], tables: &[Table]) -> std::result::Result<(), ParseError> {
        let failed = |table: &str| {
            let table = table.to_owned();
            move |source: duckdb::Error| ParseError::Register { table, source }
        };
        let all = identifiers.join(", ");

        let transaction = self.connection.transaction().map_err(failed(&all))?;
        for (identifier, table) in identifiers.iter().zip(tables) {
            let columns = table.physical_columns();
            if columns.len() < table.columns.len() {
                warn!(
                    "Table '{identifier}' repeats column names {:?}; later columns replace earlier ones",
                    table.column_names()
                );
            }

            transaction
                .execute_batch(&create_table_sql(identifier, &columns))
                .map_err(failed(identifier))?;

            let mut appender = transaction.appender(identifier).map_err(failed(identifier))?;
            for row in &table.rows {
                let values = columns.iter().map(|column| Value::from(&row[column.source]));
                appender
                    .append_row(appender_params_from_iter(values))
                    .map_err(failed(identifier))?;
            }
            appender.flush().map_err(failed(identifier))?;
        }
        transaction.commit().map_err(failed(&all))
    }
}

fn create_table_sql(identifier: &str, columns: &[PhysicalColumn]) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .map(|column| format!("\"{}\" {}", column.name, column.kind.sql_type()))
        .collect();
    format!("CREATE TABLE \"{identifier}\" ({})", definitions.join(", "))
}
