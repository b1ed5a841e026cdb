//! # Spreadsheet readers
//!
//! Turns uploaded bytes into sparse [`Sheet`]s. The container format is
//! detected from the content, never from the file name, so a renamed upload
//! still parses and a mislabelled one fails cleanly:
//!
//! * zip packages holding `xl/workbook.xml` are read as Office Open XML
//!   (`.xlsx`, `.xlsm`);
//! * zip packages with the OpenDocument spreadsheet `mimetype`, or a bare
//!   `content.xml`, are read as `.ods`;
//! * OLE compound documents are read as legacy `.xls` (BIFF8). Encrypted
//!   workbooks, which Office also stores as OLE documents, are refused.

pub(crate) mod cell;
pub(crate) mod excel;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::error::ParseError;
use crate::error::ResultMessage;
use crate::helpers::cfb;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::ods::OdsWorkbook;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsWorkbook;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::io::Cursor;
use zip::ZipArchive;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const OLE_SIGNATURE: [u8; 8] = cfb::SIGNATURE.to_le_bytes();

/// A parsed workbook container.
pub(crate) trait Workbook {
    /// Sheet names in the workbook's native order.
    fn sheet_names(&self) -> Vec<String>;

    fn read_sheet(&mut self, name: &str) -> Result<Sheet, ParseError>;

    /// Every sheet in native order.
    fn read_sheets(&mut self) -> Result<Vec<Sheet>, ParseError> {
        self.sheet_names()
            .iter()
            .map(|name| self.read_sheet(name).with_prefix(&format!("sheet '{name}'")))
            .collect()
    }
}

/// Detects the format of `bytes` and opens the workbook.
pub(crate) fn open_workbook(file_name: &str, bytes: &[u8]) -> Result<Box<dyn Workbook>, ParseError> {
    if bytes.starts_with(&OLE_SIGNATURE) {
        return Ok(Box::new(XlsWorkbook::open(file_name, bytes)?));
    }
    if !bytes.starts_with(ZIP_SIGNATURE) {
        Err(ParseError::UnsupportedFormat(file_name.to_owned()))?
    }

    let mut zip = ZipArchive::new(Cursor::new(bytes.to_vec()))?;
    let is_ods = zip
        .read_to_string("mimetype")?
        .map(|mimetype| mimetype.trim() == ods::MIME_TYPE)
        .unwrap_or(false);
    let has_workbook = zip.contains("xl/workbook.xml");
    if is_ods || (zip.contains("content.xml") && !has_workbook) {
        Ok(Box::new(OdsWorkbook::open(file_name, zip)?))
    } else if has_workbook {
        Ok(Box::new(XlsxWorkbook::open(file_name, zip)?))
    } else {
        Err(ParseError::UnsupportedFormat(file_name.to_owned()))
    }
}

/// Opens `bytes` and reads all of its sheets.
pub(crate) fn read_workbook(file_name: &str, bytes: &[u8]) -> Result<Vec<Sheet>, ParseError> {
    let mut workbook = open_workbook(file_name, bytes)?;
    workbook.read_sheets()
}
