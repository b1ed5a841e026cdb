use crate::error::ParseError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::ZipBytes;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Workbook;
use quick_xml::events::Event;
use quick_xml::name::QName;
use tracing::debug;

pub(crate) const MIME_TYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const SPREADSHEET: QName = QName(b"office:spreadsheet");
const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
const ANNOTATION: QName = QName(b"office:annotation");
const PARAGRAPH: QName = QName(b"text:p");
const SPACE: QName = QName(b"text:s");
const TAB: QName = QName(b"text:tab");
const LINE_BREAK: QName = QName(b"text:line-break");

/// An OpenDocument spreadsheet (`.ods`) held in memory.
pub(crate) struct OdsWorkbook {
    zip: ZipBytes,
    sheets: Vec<String>,
}

impl OdsWorkbook {
    pub(crate) fn open(file_name: &str, mut zip: ZipBytes) -> Result<Self, ParseError> {
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(ParseError::PasswordProtected(file_name.to_owned()))?;
        }
        let sheets = load_sheet_names(&mut zip)?;
        if sheets.is_empty() {
            Err(ParseError::EmptyWorkbook(file_name.to_owned()))?;
        }
        debug!(file = file_name, sheets = sheets.len(), "opened ods workbook");
        Ok(Self {
            zip,
            sheets,
        })
    }

    /// Reads the tables of `content.xml` in one pass, all of them or only the
    /// one named `only`.
    fn read_tables(&mut self, only: Option<&str>) -> Result<Vec<Sheet>, ParseError> {
        let mut sheets = Vec::<Sheet>::new();
        let mut reader = self.zip.required_xml_reader("content.xml")?;
        'sheets: loop {
            let mut sheet_name = None::<String>;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == SPREADSHEET => break 'sheets,
                Event::Start(event) if event.name() == TABLE => {
                    let name = event.get_attribute_value("table:name")?.unwrap_or_default().to_string();
                    if only.map(|only| only == name).unwrap_or(true) {
                        sheet_name = Some(name);
                        break;
                    }
                }
            });
            let Some(sheet_name) = sheet_name else {
                break;
            };
            let mut sheet = Sheet::new(&sheet_name);

            let mut row = 0usize;
            let mut col = 0usize;
            let mut row_count = 1usize;
            let mut col_count = 1usize;
            let mut kind = CellType::default();
            let mut value = String::new();
            let mut paragraphs = 0usize;
            let mut element_context = false; // collecting string content
            let mut comment_context = false;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == TABLE => break,
                Event::Start(event) if event.name() == TABLE_ROW => {
                    row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                    col = 0;
                }
                Event::End(event) if event.name() == TABLE_ROW => row += row_count,
                Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    value.clear();
                    paragraphs = 0;
                    col_count = event.parse_attribute_value("table:number-columns-repeated")?.unwrap_or(1);
                    let value_type = event.get_attribute_value("office:value-type")?;
                    let is_error = event.get_attribute_value("calcext:value-type")?
                        .map(|it| it == "error")
                        .unwrap_or(false);
                    kind = match value_type.as_deref() {
                        None => CellType::Empty,
                        Some(_) if is_error => CellType::Error,
                        Some("boolean") => CellType::Boolean,
                        Some("date") => CellType::IsoDateTime,
                        Some("time") => CellType::IsoDuration,
                        Some("string") => CellType::Text,
                        Some(_) => CellType::Number,
                    };
                    match kind {
                        CellType::Boolean => {
                            let truthy = event.get_attribute_value("office:boolean-value")?
                                .map(|it| it != "false" && it != "0")
                                .unwrap_or(false);
                            value.push_str(if truthy { "1" } else { "0" });
                        }
                        CellType::IsoDateTime => if let Some(data) = event.get_attribute_value("office:date-value")? {
                            value.push_str(&data);
                        },
                        CellType::IsoDuration => if let Some(data) = event.get_attribute_value("office:time-value")? {
                            value.push_str(&data);
                        },
                        CellType::Number => if let Some(data) = event.get_attribute_value("office:value")? {
                            value.push_str(&data);
                        },
                        CellType::Text => match event.get_attribute_value("office:string-value")? {
                            Some(data) => value.push_str(&data),
                            None => element_context = true,
                        },
                        _ => (),
                    }
                }
                Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    if !value.is_empty() && !matches!(kind, CellType::Empty | CellType::Error) {
                        for row_offset in 0..row_count {
                            for col_offset in 0..col_count {
                                sheet.push(Cell::new(row + row_offset, col + col_offset, kind, value.to_owned()));
                            }
                        }
                    }
                    col += col_count;
                    kind = CellType::Empty;
                    element_context = false;
                    comment_context = false;
                }
                Event::Start(event) if element_context && event.name() == ANNOTATION => comment_context = true,
                Event::End(event) if element_context && comment_context && event.name() == ANNOTATION => comment_context = false,
                Event::Start(event) if element_context && !comment_context && event.name() == PARAGRAPH => {
                    if paragraphs > 0 {
                        value.push('\n');
                    }
                    paragraphs += 1;
                }
                Event::Start(event) if element_context && !comment_context && event.name() == SPACE => {
                    let count = event.parse_attribute_value("text:c")?.unwrap_or(1usize);
                    value.extend(std::iter::repeat(' ').take(count));
                }
                Event::Start(event) if element_context && !comment_context && event.name() == TAB => value.push('\t'),
                Event::Start(event) if element_context && !comment_context && event.name() == LINE_BREAK => value.push('\n'),
                Event::Text(event) if element_context && !comment_context => value.push_bytes_text(&event)?,
                Event::GeneralRef(event) if element_context && !comment_context => value.push_bytes_ref(&event)?,
            });
            sheet.finish();
            sheets.push(sheet);
            if only.is_some() {
                break;
            }
        }
        Ok(sheets)
    }
}

impl Workbook for OdsWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.to_owned()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, ParseError> {
        self.read_tables(Some(sheet_name))?
            .pop()
            .ok_or_else(|| ParseError::SheetNotFound(sheet_name.to_owned()))
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ParseError> {
        self.read_tables(None)
    }
}

/// A `mimetype` part, when present, must name an OpenDocument spreadsheet.
fn check_mime(zip: &mut ZipBytes) -> Result<(), ParseError> {
    if let Some(mimetype) = zip.read_to_string("mimetype")? {
        if mimetype.trim() != MIME_TYPE {
            Err(ParseError::OdsMimeType)?;
        }
    }
    Ok(())
}

fn is_password_protected(zip: &mut ZipBytes) -> Result<bool, ParseError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = true,
        Event::End(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == QName(b"manifest:encryption-data") => {
            return Ok(true);
        }
    });
    Ok(false)
}

fn load_sheet_names(zip: &mut ZipBytes) -> Result<Vec<String>, ParseError> {
    let mut reader = zip.required_xml_reader("content.xml")?;
    let mut names = Vec::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TABLE => {
            names.push(event.get_attribute_value("table:name")?.unwrap_or_default().to_string());
        }
    });
    Ok(names)
}
