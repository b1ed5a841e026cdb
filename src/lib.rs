//! # sheetquery
//!
//! Loads spreadsheet uploads into a private in-memory DuckDB database and
//! answers bounded SQL queries over them.
//!
//! ## Features
//!
//! - **Formats**: Office Open XML workbooks (`.xlsx`, `.xlsm`), legacy Excel
//!   workbooks (`.xls`) and OpenDocument spreadsheets (`.ods`), detected from
//!   the file content
//! - **One table per sheet**: the first row is the header, column types are
//!   inferred from the cells below it
//! - **Stable identifiers**: `<file>__<sheet>`, restricted to `[a-z0-9_]` and
//!   suffixed `_2`, `_3`, … on collision
//! - **Catalog**: file, sheet, row count, columns, types and a sample per table,
//!   serializable for an external query planner
//! - **Bounded queries**: every statement runs inside an outer `LIMIT`
//!
//! ## Example
//!
//! ```no_run
//! use sheetquery::Store;
//!
//! # fn main() -> sheetquery::Result<()> {
//! let mut store = Store::in_memory()?;
//! store.ingest_path("Sales.xlsx".as_ref())?;
//! let result = store.run_query("SELECT * FROM sales__q1", 200)?;
//! println!("{} row(s)", result.row_count());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
mod helpers;
pub mod logging;
pub mod query;
pub mod session;
mod spreadsheet;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use catalog::Catalog;
pub use catalog::TableMetadata;
pub use config::StoreConfig;
pub use database::column::ColumnType;
pub use database::naming::normalize_name;
pub use database::naming::table_identifier;
pub use database::value::Fields;
pub use database::value::Record;
pub use database::value::Scalar;
pub use error::Error;
pub use error::ParseError;
pub use error::QueryExecutionError;
pub use error::Result;
pub use query::TabularResult;
pub use session::Answer;
pub use session::Planner;
pub use session::QueryPlan;
pub use session::Session;
pub use session::SessionError;
pub use store::IngestReport;
pub use store::Store;
