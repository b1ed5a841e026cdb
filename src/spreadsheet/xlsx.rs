use crate::error::ParseError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::DateSystem;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::ZipBytes;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Workbook;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;

const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh"); // ruby annotations, not part of the value
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// An Office Open XML workbook (`.xlsx`, `.xlsm`) held in memory.
pub(crate) struct XlsxWorkbook {
    zip: ZipBytes,
    /// Cell type per style index
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// (sheet name, part path) in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxWorkbook {
    pub(crate) fn open(file_name: &str, mut zip: ZipBytes) -> Result<Self, ParseError> {
        let (sheets, system) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(ParseError::EmptyWorkbook(file_name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, system)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!(file = file_name, sheets = sheets.len(), shared_strings = shared_strings.len(), "opened xlsx workbook");
        Ok(Self {
            zip,
            number_formats,
            shared_strings,
            sheets,
        })
    }
}

impl Workbook for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, ParseError> {
        let path = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, path)| path.to_owned())
            .ok_or_else(|| ParseError::SheetNotFound(sheet_name.to_owned()))?;

        let mut sheet = Sheet::new(sheet_name);
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut reader = self.zip.required_xml_reader(&path)?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                row = event.get_attribute_value("r")?
                    .and_then(|r| r.parse::<usize>().ok())
                    .filter(|r| *r > 0)
                    .map(|r| r - 1)
                    .unwrap_or(next_row);
                next_col = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => next_row = row + 1,
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row, next_col));
                next_col = col + 1;
                value.clear();
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::Text,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if kind == CellType::Number {
                    if let Some(style) = event.get_attribute_value("s")?.filter(|s| !s.is_empty()) {
                        let index = style.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if kind == CellType::SharedString {
                    let text = value.trim().parse::<usize>().ok()
                        .and_then(|index| self.shared_strings.get(index))
                        .ok_or_else(|| ParseError::CellValue {
                            sheet: sheet_name.to_owned(),
                            reference: index_to_reference(row, col),
                            message: format!("unknown shared string '{value}'"),
                        })?;
                    value = text.to_owned();
                    kind = CellType::Text;
                }
                if !value.is_empty() && !matches!(kind, CellType::Empty | CellType::Error) {
                    sheet.push(Cell::new(row, col, kind, value.to_owned()));
                }
                kind = CellType::Empty;
            }
        });
        sheet.finish();
        Ok(sheet)
    }
}

/// Reads sheet names and part paths from `xl/workbook.xml`, and the date
/// system from its `workbookPr`.
fn load_workbook(zip: &mut ZipBytes) -> Result<(Vec<(String, String)>, DateSystem), ParseError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.required_xml_reader("xl/workbook.xml")?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut system = DateSystem::Excel1900;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            let is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
            if is_1904 {
                system = DateSystem::Excel1904;
            }
        }
    });
    Ok((sheets, system))
}

/// Reads `numFmts` and `cellXfs` from `xl/styles.xml`. A workbook without
/// styles treats every number as plain.
fn load_number_formats(zip: &mut ZipBytes, system: DateSystem) -> Result<Vec<CellType>, ParseError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, system));
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map(|id| id.to_string()).unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, system))
}

fn load_shared_strings(zip: &mut ZipBytes) -> Result<Vec<String>, ParseError> {
    let mut shared_strings = Vec::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Collects the text up to `end_tag`. Rich text runs are concatenated and
/// phonetic runs skipped; `is_text_content` is set when the element itself
/// holds the text (`<v>`) rather than nested `<t>` elements.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, ParseError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::xlsx_package;
    use crate::fixtures::XlsxSheet;
    use std::io::Cursor;
    use zip::ZipArchive;

    fn open(bytes: Vec<u8>) -> XlsxWorkbook {
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        XlsxWorkbook::open("book.xlsx", zip).unwrap()
    }

    #[test]
    fn reads_sheet_names_in_workbook_order() {
        let bytes = xlsx_package(
            &[
                XlsxSheet::new("Summary", ""),
                XlsxSheet::new("Q1", ""),
                XlsxSheet::new("Q2", ""),
            ],
            &[],
        );
        let workbook = open(bytes);
        assert_eq!(workbook.sheet_names(), vec!["Summary", "Q1", "Q2"]);
    }

    #[test]
    fn reads_typed_cells() {
        let rows = r#"
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>Flag</t></is></c><c r="C1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2"><v>10</v></c><c r="B2" t="b"><v>1</v></c><c r="C2" s="1"><v>45000</v></c></row>
            <row r="3"><c r="A3" t="e"><v>#DIV/0!</v></c><c r="B3" t="str"><f>A1</f><v>x &amp; y</v></c></row>
        "#;
        let mut workbook = open(xlsx_package(&[XlsxSheet::new("Data", rows)], &["Name", "When"]));
        let sheet = workbook.read_sheet("Data").unwrap();

        let cells: Vec<(String, CellType, &str)> = sheet
            .cells
            .iter()
            .map(|cell| (cell.reference(), cell.kind, cell.value.as_str()))
            .collect();
        assert_eq!(
            cells,
            vec![
                ("A1".to_owned(), CellType::Text, "Name"),
                ("B1".to_owned(), CellType::Text, "Flag"),
                ("C1".to_owned(), CellType::Text, "When"),
                ("A2".to_owned(), CellType::Number, "10"),
                ("B2".to_owned(), CellType::Boolean, "1"),
                ("C2".to_owned(), CellType::SerialDate(DateSystem::Excel1900), "45000"),
                ("B3".to_owned(), CellType::Text, "x & y"),
            ]
        );
    }

    #[test]
    fn cells_without_references_are_positioned_sequentially() {
        let rows = "<row><c t=\"inlineStr\"><is><t>a</t></is></c><c t=\"inlineStr\"><is><t>b</t></is></c></row><row><c><v>1</v></c></row>";
        let mut workbook = open(xlsx_package(&[XlsxSheet::new("Data", rows)], &["Name", "When"]));
        let sheet = workbook.read_sheet("Data").unwrap();
        let references: Vec<String> = sheet.cells.iter().map(Cell::reference).collect();
        assert_eq!(references, vec!["A1", "B1", "A2"]);
    }

    #[test]
    fn unknown_sheet_is_an_error() {
        let mut workbook = open(xlsx_package(&[XlsxSheet::new("Data", "")], &[]));
        assert!(matches!(workbook.read_sheet("Nope"), Err(ParseError::SheetNotFound(name)) if name == "Nope"));
    }

    #[test]
    fn dangling_shared_string_index_is_a_cell_error() {
        let rows = r#"<row r="1"><c r="A1" t="s"><v>99</v></c></row>"#;
        let mut workbook = open(xlsx_package(&[XlsxSheet::new("Data", rows)], &["Name", "When"]));
        let error = workbook.read_sheet("Data").unwrap_err();
        assert_eq!(error.to_string(), "Invalid cell value at 'Data!A1': unknown shared string '99'");
    }
}
