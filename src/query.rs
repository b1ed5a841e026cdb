//! Bounded execution of planner SQL against the registered tables.
//!
//! Statements are never validated by string inspection. Every statement is
//! wrapped in an outer projection whose `LIMIT` caps the result size no matter
//! what the inner statement asks for.

use crate::database::value::Record;
use crate::database::value::Scalar;
use crate::error::QueryExecutionError;
use duckdb::types::Value;
use duckdb::Connection;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use tracing::debug;
use tracing::info;

/// Rows returned by a query, in engine order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl TabularResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by column name.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.to_owned(), value.to_owned()))
                    .collect()
            })
            .collect()
    }
}

/// Trims whitespace and a single trailing `;`.
pub fn prepare(sql: &str) -> &str {
    let sql = sql.trim();
    sql.strip_suffix(';').unwrap_or(sql).trim()
}

pub fn wrap(sql: &str, limit: usize) -> String {
    format!("SELECT * FROM ({sql}) AS subquery LIMIT {limit}")
}

/// Accepts exactly one query statement (`SELECT`, `WITH`, set operations,
/// `VALUES`).
pub fn check_statement(sql: &str) -> Result<(), QueryExecutionError> {
    let rejected = |reason: String| QueryExecutionError::Rejected {
        sql: sql.to_owned(),
        reason,
    };

    let statements = Parser::parse_sql(&DuckDbDialect {}, sql).map_err(|e| rejected(e.to_string()))?;
    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(rejected("empty statement".to_owned())),
        [_] => Err(rejected("only queries are allowed".to_owned())),
        _ => Err(rejected(format!("expected one statement, found {}", statements.len()))),
    }
}

/// Runs `sql` capped at `limit` rows.
pub(crate) fn execute(
    connection: &Connection,
    sql: &str,
    limit: usize,
    statement_guard: bool,
) -> Result<TabularResult, QueryExecutionError> {
    if limit == 0 {
        return Err(QueryExecutionError::InvalidLimit);
    }

    let sql = prepare(sql);
    if statement_guard {
        check_statement(sql)?;
    }

    let wrapped = wrap(sql, limit);
    debug!("Executing: {wrapped}");
    let engine_error = |e| QueryExecutionError::engine(sql, e);

    let mut statement = connection.prepare(&wrapped).map_err(engine_error)?;
    let mut result = statement.query([]).map_err(engine_error)?;
    let mut rows = Vec::new();
    while let Some(row) = result.next().map_err(engine_error)? {
        let width = row.as_ref().column_count();
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(Scalar::from(row.get::<_, Value>(index).map_err(engine_error)?));
        }
        rows.push(values);
    }
    drop(result);

    let columns = statement.column_names();
    info!("Query returned {} row(s)", rows.len());
    Ok(TabularResult { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TABLE numbers AS SELECT range AS n, 'row ' || range AS label FROM range(1000);",
            )
            .unwrap();
        connection
    }

    #[test]
    fn prepare_strips_one_trailing_semicolon() {
        assert_eq!(prepare("  SELECT 1;  "), "SELECT 1");
        assert_eq!(prepare("SELECT 1 ;"), "SELECT 1");
        assert_eq!(prepare("SELECT 1;;"), "SELECT 1;");
        assert_eq!(prepare("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn wrap_bounds_the_statement() {
        assert_eq!(
            wrap("SELECT * FROM t LIMIT 5000", 200),
            "SELECT * FROM (SELECT * FROM t LIMIT 5000) AS subquery LIMIT 200"
        );
    }

    #[test]
    fn outer_limit_wins() {
        let connection = connection();
        let result = execute(&connection, "SELECT n FROM numbers ORDER BY n", 200, false).unwrap();
        assert_eq!(result.row_count(), 200);

        let result = execute(&connection, "SELECT n FROM numbers LIMIT 5000;", 200, false).unwrap();
        assert_eq!(result.row_count(), 200);

        let result = execute(&connection, "SELECT n FROM numbers LIMIT 3", 200, false).unwrap();
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn returns_columns_and_typed_values() {
        let connection = connection();
        let result = execute(
            &connection,
            "SELECT n, label, n * 1.5 AS half, DATE '2024-01-31' AS day FROM numbers WHERE n = 2",
            10,
            false,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["n", "label", "half", "day"]);
        assert_eq!(result.rows[0][0], Scalar::Integer(2));
        assert_eq!(result.rows[0][1], Scalar::Text("row 2".to_owned()));
        assert_eq!(result.rows[0][2], Scalar::Float(3.0));
        assert_eq!(result.rows[0][3].to_string(), "2024-01-31");
        assert_eq!(result.records()[0].get("label"), Some(&Scalar::Text("row 2".to_owned())));
    }

    #[test]
    fn empty_results_keep_their_columns() {
        let connection = connection();
        let result = execute(&connection, "SELECT n FROM numbers WHERE n < 0", 10, false).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["n"]);
    }

    #[test]
    fn engine_diagnostics_are_kept_verbatim() {
        let connection = connection();
        let error = execute(&connection, "SELECT * FROM no_such_table;", 10, false).unwrap_err();
        match &error {
            QueryExecutionError::Engine { sql, message } => {
                assert_eq!(sql, "SELECT * FROM no_such_table");
                assert!(message.contains("no_such_table"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(execute(&connection, "SELEC n FROM numbers", 10, false).is_err());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let connection = connection();
        assert_eq!(
            execute(&connection, "SELECT 1", 0, false),
            Err(QueryExecutionError::InvalidLimit)
        );
    }

    #[test]
    fn guard_accepts_single_queries_only() {
        assert!(check_statement("SELECT 1").is_ok());
        assert!(check_statement("WITH t AS (SELECT 1 AS x) SELECT x FROM t").is_ok());
        assert!(check_statement("SELECT 1 UNION ALL SELECT 2").is_ok());

        assert!(matches!(
            check_statement("SELECT 1; DROP TABLE numbers"),
            Err(QueryExecutionError::Rejected { .. })
        ));
        assert!(matches!(
            check_statement("DELETE FROM numbers"),
            Err(QueryExecutionError::Rejected { .. })
        ));
        assert!(check_statement("").is_err());
    }

    #[test]
    fn guard_runs_before_the_engine() {
        let connection = connection();
        let error = execute(&connection, "SELECT 1; SELECT 2", 10, true).unwrap_err();
        assert!(matches!(error, QueryExecutionError::Rejected { .. }), "{error:?}");

        let result = execute(&connection, "SELECT count(*) AS total FROM numbers", 10, true).unwrap();
        assert_eq!(result.rows, vec![vec![Scalar::Integer(1000)]]);
    }
}
