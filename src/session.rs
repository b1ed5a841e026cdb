//! One interactive conversation: uploads, questions and their answers.
//!
//! The SQL for a question comes from an external [`Planner`]. The session only
//! supplies it with the catalog and runs whatever it returns through the
//! bounded query path.

use crate::catalog::Catalog;
use crate::error::ParseError;
use crate::error::QueryExecutionError;
use crate::query::TabularResult;
use crate::store::IngestReport;
use crate::store::Store;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

/// Rules handed to the planner ahead of the catalog.
pub const PLANNER_INSTRUCTIONS: &str = "\
You are a spreadsheet analytics assistant.
You will be given a catalog of SQL tables (DuckDB) derived from uploaded spreadsheet files.
Produce ONE DuckDB-compatible SQL query that answers the question.

Rules:
- Only use tables and columns from the catalog.
- Double-quote table and column names that start with a digit (e.g. \"2024__q1\").
- Prefer joins on clearly matching keys (e.g. CustomerID, Date, Region) when comparing tables.
- If the question is ambiguous, make a reasonable assumption and state it in the explanation.
- Never write destructive SQL (no DROP, UPDATE or DELETE).
- Return JSON with the keys \"sql\" and \"explanation\" only.
- Do not include a trailing semicolon in the SQL.
- Return only ONE SELECT statement.
";

/// What the planner proposes for a question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryPlan {
    pub sql: String,
    pub explanation: String,
}

impl QueryPlan {
    /// Parses the planner's JSON reply. Both keys are required and nothing
    /// else is allowed.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// JSON schema a structured-output planner should be held to.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sql": {"type": "string"},
                "explanation": {"type": "string"}
            },
            "required": ["sql", "explanation"],
            "additionalProperties": false
        })
    }
}

/// A chat message for a planner backed by a language model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannerMessage {
    pub role: &'static str,
    pub content: String,
}

/// Instructions, truncated catalog and question, in the order a chat
/// planner should see them.
pub fn planner_messages(question: &str, catalog: &Catalog, max_chars: usize) -> serde_json::Result<Vec<PlannerMessage>> {
    Ok(vec![
        PlannerMessage {
            role: "system",
            content: PLANNER_INSTRUCTIONS.to_owned(),
        },
        PlannerMessage {
            role: "user",
            content: format!("CATALOG:\n{}", catalog.planner_context(max_chars)?),
        },
        PlannerMessage {
            role: "user",
            content: format!("QUESTION:\n{question}"),
        },
    ])
}

/// Turns a question into SQL. Implementations are opaque to the session.
pub trait Planner {
    fn plan(&self, question: &str, catalog: &Catalog) -> anyhow::Result<QueryPlan>;
}

impl<F> Planner for F
where
    F: Fn(&str, &Catalog) -> anyhow::Result<QueryPlan>,
{
    fn plan(&self, question: &str, catalog: &Catalog) -> anyhow::Result<QueryPlan> {
        self(question, catalog)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Upload spreadsheet files first")]
    NoTables,

    #[error("Planner failed: {0:#}")]
    Planner(anyhow::Error),
}

/// The plan for a question and what running it produced.
///
/// A failed query is part of the answer, not an error of the session.
#[derive(Debug)]
pub struct Answer {
    pub plan: QueryPlan,
    pub outcome: Result<TabularResult, QueryExecutionError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

pub struct Session<P> {
    store: Store,
    planner: P,
    history: Vec<Turn>,
}

impl<P: Planner> Session<P> {
    pub fn new(store: Store, planner: P) -> Self {
        Self {
            store,
            planner,
            history: Vec::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        self.store.catalog()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Chat messages for `question` with the catalog cut to the configured
    /// size.
    pub fn planner_messages(&self, question: &str) -> serde_json::Result<Vec<PlannerMessage>> {
        planner_messages(question, self.catalog(), self.store.config().planner_context_chars)
    }

    /// Loads every upload; each file succeeds or fails on its own.
    pub fn upload<N, B, I>(&mut self, files: I) -> Vec<(String, Result<IngestReport, ParseError>)>
    where
        N: Into<String>,
        B: AsRef<[u8]>,
        I: IntoIterator<Item = (N, B)>,
    {
        let outcomes = self.store.ingest_batch(files);
        let loaded = outcomes.iter().filter(|(_, outcome)| outcome.is_ok()).count();
        info!("Loaded {loaded} of {} file(s); {} table(s) available", outcomes.len(), self.catalog().len());
        outcomes
    }

    /// Plans `question` and runs the plan with the configured row limit.
    pub fn ask(&mut self, question: &str) -> Result<Answer, SessionError> {
        self.history.push(Turn {
            role: Role::User,
            content: question.to_owned(),
        });

        if self.store.catalog().is_empty() {
            return Err(SessionError::NoTables);
        }

        let plan = self
            .planner
            .plan(question, self.store.catalog())
            .map_err(SessionError::Planner)?;
        let outcome = self.store.run_query_default(&plan.sql);
        if let Err(e) = &outcome {
            warn!("SQL execution failed: {e}");
        }

        self.history.push(Turn {
            role: Role::Assistant,
            content: format!("{}\n\nSQL:\n{}", plan.explanation, plan.sql),
        });
        Ok(Answer { plan, outcome })
    }
}
