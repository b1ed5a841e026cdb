//! Identifier rules for registered tables and their columns.
//!
//! Every name that reaches the engine is restricted to `[a-zA-Z0-9_]`, so
//! generated SQL can reference it without quoting. Names may still start
//! with a digit (`2024__q1`); those must be double-quoted in queries.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_NAME_LENGTH: usize = 80;
pub(crate) const TABLE_PLACEHOLDER: &str = "table";
pub(crate) const COLUMN_PLACEHOLDER: &str = "column";

static INVALID_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("Hardcode regex pattern"));
static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").expect("Hardcode regex pattern"));

/// Replaces disallowed runs with `_`, collapses `_` runs, trims `_` at both
/// ends and truncates. Case is preserved. Distinct inputs may map to the
/// same output.
pub fn normalize_name(name: &str, placeholder: &str, max_length: usize) -> String {
    let replaced = INVALID_CHARACTERS.replace_all(name.trim(), "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    let name = if trimmed.is_empty() { placeholder } else { trimmed };
    truncate(name, max_length).to_owned()
}

/// Column name for a header cell; empty headers are named after their
/// position as `Unnamed: <index>` before normalization.
pub(crate) fn column_name(header: Option<&str>, index: usize, max_length: usize) -> String {
    match header.map(str::trim).filter(|header| !header.is_empty()) {
        Some(header) => normalize_name(header, COLUMN_PLACEHOLDER, max_length),
        None => normalize_name(&format!("Unnamed: {index}"), COLUMN_PLACEHOLDER, max_length),
    }
}

/// File name without directory and last extension: `C:\in\Sales.2024.xlsx`
/// gives `Sales.2024`.
pub fn file_base_name(file_name: &str) -> &str {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => name,
    }
}

/// Candidate identifier for a sheet: `<file base>__<sheet>`, each part
/// normalized separately, then lowercased.
pub fn table_identifier(file_name: &str, sheet_name: &str, max_length: usize) -> String {
    let parts: Vec<String> = [file_base_name(file_name), sheet_name]
        .iter()
        .map(|part| normalize_name(part, "", usize::MAX))
        .filter(|part| !part.is_empty())
        .collect();
    let joined = parts.join("__").to_ascii_lowercase();
    let truncated = truncate(&joined, max_length).trim_end_matches('_');
    if truncated.is_empty() {
        truncate(TABLE_PLACEHOLDER, max_length).to_owned()
    } else {
        truncated.to_owned()
    }
}

/// Appends `_2`, `_3`, … to `candidate` until `is_taken` rejects it, shortening
/// the base so the result stays within `max_length`.
pub fn unique_identifier(candidate: &str, max_length: usize, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(candidate) {
        return candidate.to_owned();
    }
    let mut index = 2usize;
    loop {
        let suffix = format!("_{index}");
        let base = truncate(candidate, max_length.saturating_sub(suffix.len()));
        let identifier = format!("{base}{suffix}");
        if !is_taken(&identifier) {
            return identifier;
        }
        index += 1;
    }
}

/// Names are ASCII after normalization, but placeholders and suffix bases are
/// cut on character boundaries anyway.
fn truncate(name: &str, max_length: usize) -> &str {
    match name.char_indices().nth(max_length) {
        Some((index, _)) => &name[..index],
        None => name,
    }
}
