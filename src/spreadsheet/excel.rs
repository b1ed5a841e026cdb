//! Helpers shared by the Excel readers: OOXML relationships and the
//! style-index to number-format table used by both `.xlsx` and `.xls`.
use crate::error::ParseError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::DateSystem;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::Cursor;
use zip::ZipArchive;

pub(crate) type ZipBytes = ZipArchive<Cursor<Vec<u8>>>;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Maps relationship ids to worksheet part paths.
pub(super) fn load_relationships(zip: &mut ZipBytes, path: &str) -> Result<HashMap<String, String>, ParseError> {
    let mut reader = zip.required_xml_reader(path)?;
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves each `cellXfs` entry to a cell type, custom formats first.
pub(super) fn load_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    system: DateSystem,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, system))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Relationship targets are relative to `xl/` unless rooted.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(rooted) = path.strip_prefix('/') {
        rooted.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}
