//! Store settings, loadable from a TOML file.

use crate::catalog::DEFAULT_PLANNER_CONTEXT_CHARS;
use crate::database::naming::MAX_NAME_LENGTH;
use crate::database::table::MAX_SHEET_CELLS;
use crate::error::Error;
use crate::error::Result;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// Tunables of a [`Store`](crate::store::Store). Every field may be omitted
/// from the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Row cap applied by `run_query_default`.
    pub default_limit: usize,

    /// Leading rows kept per table in the catalog.
    pub sample_rows: usize,

    /// Cap on table identifiers and column names.
    pub max_name_length: usize,

    /// Parse statements before running them and reject anything that is not a
    /// single query.
    pub statement_guard: bool,

    /// Characters of catalog JSON handed to the planner.
    pub planner_context_chars: usize,

    /// Largest bounding box, in cells, a sheet may span. Larger sheets fail
    /// the upload instead of being expanded into memory.
    pub max_sheet_cells: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_limit: 200,
            sample_rows: 5,
            max_name_length: MAX_NAME_LENGTH,
            statement_guard: false,
            planner_context_chars: DEFAULT_PLANNER_CONTEXT_CHARS,
            max_sheet_cells: MAX_SHEET_CELLS,
        }
    }
}

impl StoreConfig {
    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("{}:\n  {e}", path.display())))?;
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.default_limit == 0 {
            return Err(Error::Config("default_limit must be positive".to_owned()));
        }
        if self.max_name_length < 8 {
            return Err(Error::Config("max_name_length must be at least 8".to_owned()));
        }
        if self.max_sheet_cells == 0 {
            return Err(Error::Config("max_sheet_cells must be positive".to_owned()));
        }
        Ok(self)
    }
}
