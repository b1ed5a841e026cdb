use crate::error::ParseError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_records;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::DateSystem;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Workbook;
use std::collections::HashMap;
use tracing::debug;

// BIFF8 record types
pub(crate) const FORMULA: u16 = 6;
pub(crate) const EOF: u16 = 10;
pub(crate) const DATE1904: u16 = 34;
pub(crate) const FILE_PASS: u16 = 47;
pub(crate) const CODE_PAGE: u16 = 66;
pub(crate) const BOUND_SHEET8: u16 = 133;
pub(crate) const MUL_RK: u16 = 189;
pub(crate) const XF: u16 = 224;
pub(crate) const SST: u16 = 252;
pub(crate) const LABEL_SST: u16 = 253;
pub(crate) const NUMBER: u16 = 515;
pub(crate) const LABEL: u16 = 516;
pub(crate) const BOOL_ERR: u16 = 517;
pub(crate) const STRING: u16 = 519;
pub(crate) const RK: u16 = 638;
pub(crate) const FORMAT: u16 = 1054;
pub(crate) const BOF: u16 = 2057;

/// `dt` of a `BOUNDSHEET8` record naming a worksheet, as opposed to charts
/// and macro sheets.
const WORKSHEET: u8 = 0;

/// Where a cell's type comes from: fixed by its record, or looked up by the
/// record's style index.
enum CellKind {
    Fixed(CellType),
    Style(usize),
}

/// A legacy Excel 97-2003 workbook held in memory.
pub(crate) struct XlsWorkbook {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// (sheet name, offset of its `BOF` in the stream) in workbook order
    sheets: Vec<(String, usize)>,
}

impl XlsWorkbook {
    /// Reads the workbook globals: encryption, date system, code page,
    /// number formats, shared strings and the sheet list.
    pub(crate) fn open(file_name: &str, bytes: &[u8]) -> Result<Self, ParseError> {
        let cfb = Cfb::new(bytes)?;
        if cfb.contains("EncryptionInfo") {
            Err(ParseError::PasswordProtected(file_name.to_owned()))?
        }
        let stream = match cfb.read("Workbook")? {
            Some(stream) => stream,
            None => cfb
                .read("Book")?
                .ok_or_else(|| ParseError::UnsupportedOleWorkbook(file_name.to_owned()))?,
        };

        let mut reader = Biff8Reader::new(stream);
        let mut system = DateSystem::Excel1900;
        let mut shared_strings = Vec::new();
        let mut custom_formats = HashMap::<String, String>::new();
        let mut format_indexes = Vec::<String>::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_records!(reader => {
            EOF => break,
            FILE_PASS => Err(ParseError::PasswordProtected(file_name.to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => system = DateSystem::Excel1904,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(ParseError::CodePage(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                custom_formats.insert(id.to_string(), reader.read_string_u16()?);
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_u32()? as usize;
                reader.skip(1)?;
                let kind = reader.read_u8()?;
                let name = reader.read_short_string()?;
                if kind == WORKSHEET {
                    sheets.push((name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(ParseError::EmptyWorkbook(file_name.to_owned()))?
        }

        // DATE1904 may follow the FORMAT records, so formats are classified last.
        let custom_formats = custom_formats
            .into_iter()
            .map(|(id, format)| (id, CellType::parse_custom_number_format(&format, system)))
            .collect();
        let number_formats = load_number_formats(format_indexes, custom_formats, system);
        debug!(file = file_name, sheets = sheets.len(), shared_strings = shared_strings.len(), "opened xls workbook");

        Ok(Self {
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn cell_type(&self, kind: CellKind) -> CellType {
        match kind {
            CellKind::Fixed(kind) => kind,
            CellKind::Style(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }

    fn shared_string(&self, sheet: &str, row: usize, col: usize, index: &str) -> Result<String, ParseError> {
        index
            .parse::<usize>()
            .ok()
            .and_then(|index| self.shared_strings.get(index))
            .cloned()
            .ok_or_else(|| ParseError::CellValue {
                sheet: sheet.to_owned(),
                reference: index_to_reference(row, col),
                message: format!("unknown shared string '{index}'"),
            })
    }
}

impl Workbook for XlsWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, ParseError> {
        let pointer = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, pointer)| *pointer)
            .ok_or_else(|| ParseError::SheetNotFound(sheet_name.to_owned()))?;

        let mut sheet = Sheet::new(sheet_name);
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = usize::from(self.reader.read_u16()?);
                    let first = usize::from(self.reader.read_u16()?);
                    let last = usize::from(self.reader.trailing_u16()?);
                    for col in first..=last {
                        let style = usize::from(self.reader.read_u16()?);
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell::new(row, col, self.cell_type(CellKind::Style(style)), value));
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = usize::from(self.reader.read_u16()?);
                    let col = usize::from(self.reader.read_u16()?);
                    let (kind, mut value) = match tag {
                        BOOL_ERR => read_bool_or_error(&mut self.reader)?,
                        NUMBER => read_number(&mut self.reader)?,
                        RK => read_rk(&mut self.reader)?,
                        LABEL_SST => read_label_sst(&mut self.reader)?,
                        LABEL => read_label(&mut self.reader)?,
                        _ => read_formula(&mut self.reader)?,
                    };
                    let mut kind = self.cell_type(kind);
                    if kind == CellType::SharedString {
                        value = self.shared_string(sheet_name, row, col, &value)?;
                        kind = CellType::Text;
                    }
                    if !value.is_empty() && kind != CellType::Error {
                        sheet.push(Cell::new(row, col, kind, value));
                    }
                }
                _ => (),
            }
        }
        sheet.finish();
        Ok(sheet)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, ParseError> {
    reader.skip(4)?;
    let count = reader.read_u32()? as usize;
    let mut shared_strings = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_rich_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (CellKind::Fixed(CellType::Error), String::new())
    } else {
        (CellKind::Fixed(CellType::Boolean), value.to_string())
    })
}

fn read_number(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    let style = usize::from(reader.read_u16()?);
    Ok((CellKind::Style(style), reader.read_f64()?.to_string()))
}

fn read_rk(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    let style = usize::from(reader.read_u16()?);
    Ok((CellKind::Style(style), reader.read_rk_number()?))
}

fn read_label_sst(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    reader.skip(2)?;
    Ok((CellKind::Fixed(CellType::SharedString), reader.read_u32()?.to_string()))
}

fn read_label(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    reader.skip(2)?;
    Ok((CellKind::Fixed(CellType::Text), reader.read_string_u16()?))
}

/// The cached result of a formula. A string result sits in the `STRING`
/// record that follows.
fn read_formula(reader: &mut Biff8Reader) -> Result<(CellKind, String), ParseError> {
    let style = usize::from(reader.read_u16()?);
    let result = reader.read_u64()?;
    if result & 0xFFFF_0000_0000_0000 != 0xFFFF_0000_0000_0000 {
        return Ok((CellKind::Style(style), f64::from_bits(result).to_string()));
    }
    match result & 0xFF {
        0 => match reader.next()? {
            Some(STRING) => Ok((CellKind::Fixed(CellType::Text), reader.read_string_u16()?)),
            _ => Err(ParseError::FormulaValue(result)),
        },
        1 => {
            let value = if result & 0xFF_0000 != 0 { "1" } else { "0" };
            Ok((CellKind::Fixed(CellType::Boolean), value.to_owned()))
        }
        2 => Ok((CellKind::Fixed(CellType::Error), String::new())),
        3 => Ok((CellKind::Fixed(CellType::Text), String::new())),
        _ => Err(ParseError::FormulaValue(result)),
    }
}
