//! Descriptive metadata for every registered table.

use crate::database::column::ColumnType;
use crate::database::value::Fields;
use crate::database::value::Record;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use std::collections::HashMap;

/// Planner context is cut to this many characters by default.
pub const DEFAULT_PLANNER_CONTEXT_CHARS: usize = 120_000;

/// What is known about one registered table. Never changes after
/// registration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableMetadata {
    /// Identifier the table is queryable under.
    pub table: String,
    /// Upload name the table came from.
    pub file: String,
    pub sheet: String,
    /// Data rows, header excluded.
    pub rows: usize,
    /// Normalized column names in sheet order, repeats included.
    pub cols: Vec<String>,
    pub dtypes: Fields<ColumnType>,
    /// Leading rows for the planner.
    pub sample: Vec<Record>,
}

/// Registered tables in registration order.
///
/// Insertion is the only mutation and an identifier is never replaced.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    tables: Vec<TableMetadata>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `metadata` unless its identifier is already registered. Returns
    /// whether it was added.
    pub(crate) fn insert(&mut self, metadata: TableMetadata) -> bool {
        if self.index.contains_key(&metadata.table) {
            return false;
        }
        self.index.insert(metadata.table.to_owned(), self.tables.len());
        self.tables.push(metadata);
        true
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    pub fn get(&self, table: &str) -> Option<&TableMetadata> {
        self.index.get(table).map(|position| &self.tables[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.iter()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.tables.iter().map(|metadata| metadata.table.as_str()).collect()
    }

    /// Pretty JSON object keyed by identifier.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Compact JSON handed to the query planner, cut to `max_chars`
    /// characters. Each entry omits the identifier it is keyed by.
    pub fn planner_context(&self, max_chars: usize) -> serde_json::Result<String> {
        let context = serde_json::to_string(&PlannerView(self))?;
        Ok(match context.char_indices().nth(max_chars) {
            Some((index, _)) => context[..index].to_owned(),
            None => context,
        })
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a TableMetadata;
    type IntoIter = std::slice::Iter<'a, TableMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.iter()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for metadata in &self.tables {
            map.serialize_entry(&metadata.table, metadata)?;
        }
        map.end()
    }
}

struct PlannerView<'a>(&'a Catalog);

#[derive(Serialize)]
struct PlannerEntry<'a> {
    file: &'a str,
    sheet: &'a str,
    rows: usize,
    cols: &'a [String],
    dtypes: &'a Fields<ColumnType>,
    sample: &'a [Record],
}

impl Serialize for PlannerView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for metadata in self.0.iter() {
            let entry = PlannerEntry {
                file: &metadata.file,
                sheet: &metadata.sheet,
                rows: metadata.rows,
                cols: &metadata.cols,
                dtypes: &metadata.dtypes,
                sample: &metadata.sample,
            };
            map.serialize_entry(&metadata.table, &entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::value::Scalar;
    use pretty_assertions::assert_eq;

    fn metadata(table: &str, rows: usize) -> TableMetadata {
        let mut record = Record::new();
        record.insert("id", Scalar::Integer(1));
        let mut dtypes = Fields::new();
        dtypes.insert("id", ColumnType::BigInt);
        TableMetadata {
            table: table.to_owned(),
            file: "Sales.xlsx".to_owned(),
            sheet: "Q1".to_owned(),
            rows,
            cols: vec!["id".to_owned()],
            dtypes,
            sample: vec![record],
        }
    }

    #[test]
    fn keeps_registration_order_and_refuses_replacement() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert(metadata("sales__q2", 1)));
        assert!(catalog.insert(metadata("sales__q1", 2)));
        assert!(!catalog.insert(metadata("sales__q1", 99)));

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.identifiers(), vec!["sales__q2", "sales__q1"]);
        assert_eq!(catalog.get("sales__q1").map(|it| it.rows), Some(2));
        assert!(catalog.contains("sales__q2"));
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn serializes_keyed_by_identifier() {
        let mut catalog = Catalog::new();
        catalog.insert(metadata("sales__q1", 1));
        let json: serde_json::Value = serde_json::from_str(&catalog.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sales__q1": {
                    "table": "sales__q1",
                    "file": "Sales.xlsx",
                    "sheet": "Q1",
                    "rows": 1,
                    "cols": ["id"],
                    "dtypes": {"id": "bigint"},
                    "sample": [{"id": 1}]
                }
            })
        );
    }

    #[test]
    fn planner_context_is_compact_and_bounded() {
        let mut catalog = Catalog::new();
        catalog.insert(metadata("sales__q1", 1));
        let full = catalog.planner_context(DEFAULT_PLANNER_CONTEXT_CHARS).unwrap();
        assert_eq!(
            full,
            r#"{"sales__q1":{"file":"Sales.xlsx","sheet":"Q1","rows":1,"cols":["id"],"dtypes":{"id":"bigint"},"sample":[{"id":1}]}}"#
        );
        assert_eq!(catalog.planner_context(10).unwrap(), r#"{"sales__q"#);
    }

    #[test]
    fn empty_catalog() {
        let catalog = Catalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.planner_context(100).unwrap(), "{}");
    }
}
