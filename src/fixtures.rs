//! In-memory workbook packages for tests.

use crate::spreadsheet::xls;
use quick_xml::escape::escape;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// One worksheet of a generated xlsx package; `rows` is the raw `sheetData`
/// content.
pub(crate) struct XlsxSheet {
    name: String,
    rows: String,
}

impl XlsxSheet {
    pub(crate) fn new(name: &str, rows: &str) -> Self {
        Self {
            name: name.to_owned(),
            rows: rows.to_owned(),
        }
    }

    /// Builds `sheetData` from a text grid. Numeric strings become number
    /// cells, empty strings are skipped and everything else is an inline
    /// string.
    pub(crate) fn from_grid(name: &str, grid: &[Vec<String>]) -> Self {
        let mut rows = String::new();
        for (row, values) in grid.iter().enumerate() {
            rows.push_str(&format!(r#"<row r="{}">"#, row + 1));
            for (col, value) in values.iter().enumerate() {
                let reference = crate::spreadsheet::reference::index_to_reference(row, col);
                if value.is_empty() {
                    continue;
                } else if value.parse::<f64>().is_ok() {
                    rows.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
                } else {
                    rows.push_str(&format!(
                        r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape(value.as_str())
                    ));
                }
            }
            rows.push_str("</row>");
        }
        Self::new(name, &rows)
    }
}

/// Text grid helper: `grid(&[&["a", "b"], &["1", "2"]])`.
pub(crate) fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|value| value.to_string()).collect())
        .collect()
}

/// A minimal xlsx package. Style index 1 is a date format, 2 a date-time
/// format and 3 a time format.
pub(crate) fn xlsx_package(sheets: &[XlsxSheet], shared_strings: &[&str]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut put = |name: &str, content: &str| {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    };

    put(
        "[Content_Types].xml",
        r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
    );

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr/><sheets>"#,
    );
    let mut relationships = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (index, sheet) in sheets.iter().enumerate() {
        let id = index + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
            escape(sheet.name.as_str())
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#
        ));
    }
    workbook.push_str("</sheets></workbook>");
    relationships.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#,
        sheets.len() + 1
    ));
    put("xl/workbook.xml", &workbook);
    put("xl/_rels/workbook.xml.rels", &relationships);

    for (index, sheet) in sheets.iter().enumerate() {
        put(
            &format!("xl/worksheets/sheet{}.xml", index + 1),
            &format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                sheet.rows
            ),
        );
    }

    put(
        "xl/styles.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd\ hh:mm"/></numFmts><cellXfs count="4"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/><xf numFmtId="21"/></cellXfs></styleSheet>"#,
    );

    if !shared_strings.is_empty() {
        let mut content = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        for string in shared_strings {
            content.push_str(&format!("<si><t>{}</t></si>", escape(*string)));
        }
        content.push_str("</sst>");
        put("xl/sharedStrings.xml", &content);
    }

    writer.finish().unwrap().into_inner()
}

/// Convenience for a package built from text grids.
pub(crate) fn xlsx_from_grids(sheets: &[(&str, Vec<Vec<String>>)]) -> Vec<u8> {
    let sheets: Vec<XlsxSheet> = sheets
        .iter()
        .map(|(name, grid)| XlsxSheet::from_grid(name, grid))
        .collect();
    xlsx_package(&sheets, &[])
}

/// A minimal ods package whose `office:spreadsheet` holds `tables`.
pub(crate) fn ods_package(tables: &str, encrypted: bool) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut put = |name: &str, content: &str| {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    };

    put("mimetype", "application/vnd.oasis.opendocument.spreadsheet");
    let encryption = if encrypted {
        r#"<manifest:encryption-data manifest:checksum-type="SHA1/1K"/>"#
    } else {
        ""
    };
    put(
        "META-INF/manifest.xml",
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0"><manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/><manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml">{encryption}</manifest:file-entry></manifest:manifest>"#
        ),
    );
    put(
        "content.xml",
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:calcext="urn:org:documentfoundation:names:experimental:calc:xmlns:calcext:1.0"><office:body><office:spreadsheet>{tables}</office:spreadsheet></office:body></office:document-content>"#
        ),
    );

    writer.finish().unwrap().into_inner()
}

const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;
const SECTOR_SIZE: usize = 512;

enum Placement {
    Empty,
    Mini(u32),
    Regular(usize),
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn padded(mut bytes: Vec<u8>, size: usize, fill: u8) -> Vec<u8> {
    bytes.resize(bytes.len().div_ceil(size) * size, fill);
    bytes
}

/// A version 3 compound document holding `streams` under the root storage.
/// Streams shorter than 4096 bytes go to the mini stream.
pub(crate) fn compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut mini_stream = Vec::<u8>::new();
    let mut mini_table = Vec::<u32>::new();
    let mut regular = Vec::<&[u8]>::new();
    let mut placements = Vec::<Placement>::new();
    for (_, data) in streams {
        if data.is_empty() {
            placements.push(Placement::Empty);
        } else if data.len() < 4096 {
            let start = mini_table.len() as u32;
            let count = data.len().div_ceil(64) as u32;
            mini_table.extend((1..count).map(|index| start + index));
            mini_table.push(END_OF_CHAIN);
            mini_stream.extend_from_slice(data);
            mini_stream.resize(mini_table.len() * 64, 0);
            placements.push(Placement::Mini(start));
        } else {
            placements.push(Placement::Regular(regular.len()));
            regular.push(*data);
        }
    }

    // Sector order: allocation table, directory, mini table, mini stream,
    // regular streams.
    let mut payloads: Vec<Vec<u8>> = vec![
        vec![0u8; (1 + streams.len()) * 128],
        words(&mini_table),
        mini_stream.to_owned(),
    ];
    payloads.extend(regular.iter().map(|data| data.to_vec()));
    let counts: Vec<usize> = payloads.iter().map(|payload| payload.len().div_ceil(SECTOR_SIZE)).collect();
    let total: usize = counts.iter().sum();
    let mut table_sectors = 1usize;
    while table_sectors * (SECTOR_SIZE / 4) < total + table_sectors {
        table_sectors += 1;
    }
    assert!(table_sectors <= 109, "fixture too large for the header allocation list");

    let mut starts = Vec::<u32>::new();
    let mut table = vec![FAT_SECTOR; table_sectors];
    for count in &counts {
        let start = table.len() as u32;
        starts.push(if *count == 0 { END_OF_CHAIN } else { start });
        table.extend((1..*count as u32).map(|index| start + index));
        if *count > 0 {
            table.push(END_OF_CHAIN);
        }
    }
    table.resize(table_sectors * (SECTOR_SIZE / 4), FREE_SECTOR);

    let entry = |name: &str, kind: u8, child: u32, right: u32, start: u32, size: usize| {
        let mut entry = vec![0u8; 128];
        let name: Vec<u8> = name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect();
        entry[..name.len()].copy_from_slice(&name);
        entry[64..66].copy_from_slice(&(name.len() as u16).to_le_bytes());
        entry[66] = kind;
        entry[67] = 1;
        entry[68..72].copy_from_slice(&FREE_SECTOR.to_le_bytes());
        entry[72..76].copy_from_slice(&right.to_le_bytes());
        entry[76..80].copy_from_slice(&child.to_le_bytes());
        entry[116..120].copy_from_slice(&start.to_le_bytes());
        entry[120..128].copy_from_slice(&(size as u64).to_le_bytes());
        entry
    };
    let first_child = if streams.is_empty() { FREE_SECTOR } else { 1 };
    let mut directory = entry("Root Entry", 5, first_child, FREE_SECTOR, starts[2], mini_stream.len());
    for (index, ((name, data), placement)) in streams.iter().zip(&placements).enumerate() {
        let right = if index + 1 < streams.len() { index as u32 + 2 } else { FREE_SECTOR };
        let start = match placement {
            Placement::Empty => END_OF_CHAIN,
            Placement::Mini(start) => *start,
            Placement::Regular(index) => starts[3 + index],
        };
        directory.extend(entry(*name, 2, FREE_SECTOR, right, start, data.len()));
    }
    payloads[0] = directory;
    payloads[1] = padded(words(&mini_table), SECTOR_SIZE, 0xFF);

    let mut header = vec![0u8; SECTOR_SIZE];
    header[..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&(table_sectors as u32).to_le_bytes());
    header[48..52].copy_from_slice(&starts[0].to_le_bytes());
    header[56..60].copy_from_slice(&4096u32.to_le_bytes());
    header[60..64].copy_from_slice(&starts[1].to_le_bytes());
    header[64..68].copy_from_slice(&(counts[1] as u32).to_le_bytes());
    header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    let mut allocation_list: Vec<u32> = (0..table_sectors as u32).collect();
    allocation_list.resize(109, FREE_SECTOR);
    header[76..].copy_from_slice(&words(&allocation_list));

    let mut bytes = header;
    bytes.extend(words(&table));
    for payload in payloads {
        bytes.extend(padded(payload, SECTOR_SIZE, 0));
    }
    bytes
}

fn biff8_record(stream: &mut Vec<u8>, kind: u16, body: &[u8]) {
    stream.extend(kind.to_le_bytes());
    stream.extend((body.len() as u16).to_le_bytes());
    stream.extend(body);
}

/// Option byte and characters of an `XLUnicodeString`; compressed when every
/// character fits in one byte.
fn biff8_characters(text: &str) -> Vec<u8> {
    if text.chars().all(|character| (character as u32) < 0x100) {
        let mut bytes = vec![0u8];
        bytes.extend(text.chars().map(|character| character as u8));
        bytes
    } else {
        let mut bytes = vec![1u8];
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }
}

fn biff8_string(text: &str) -> Vec<u8> {
    let mut bytes = (text.encode_utf16().count() as u16).to_le_bytes().to_vec();
    bytes.extend(biff8_characters(text));
    bytes
}

/// Records of one cell in a generated `.xls` sheet.
pub(crate) struct XlsCell {
    records: Vec<(u16, Vec<u8>)>,
}

impl XlsCell {
    fn new(kind: u16, row: u16, col: u16, style: u16, tail: &[u8]) -> Self {
        let mut body = Vec::new();
        body.extend(row.to_le_bytes());
        body.extend(col.to_le_bytes());
        body.extend(style.to_le_bytes());
        body.extend(tail);
        Self {
            records: vec![(kind, body)],
        }
    }

    pub(crate) fn number(row: u16, col: u16, value: f64, style: u16) -> Self {
        Self::new(xls::NUMBER, row, col, style, &value.to_le_bytes())
    }

    pub(crate) fn label(row: u16, col: u16, text: &str) -> Self {
        Self::new(xls::LABEL, row, col, 0, &biff8_string(text))
    }

    pub(crate) fn shared(row: u16, col: u16, index: u32) -> Self {
        Self::new(xls::LABEL_SST, row, col, 0, &index.to_le_bytes())
    }

    pub(crate) fn boolean(row: u16, col: u16, value: bool) -> Self {
        Self::new(xls::BOOL_ERR, row, col, 0, &[u8::from(value), 0])
    }

    pub(crate) fn error(row: u16, col: u16, code: u8) -> Self {
        Self::new(xls::BOOL_ERR, row, col, 0, &[code, 1])
    }

    /// Integers from `col` rightwards, as one `MULRK` record.
    pub(crate) fn integers(row: u16, col: u16, values: &[i32], style: u16) -> Self {
        let mut body = Vec::new();
        body.extend(row.to_le_bytes());
        body.extend(col.to_le_bytes());
        for value in values {
            body.extend(style.to_le_bytes());
            body.extend((((*value as u32) << 2) | 0x02).to_le_bytes());
        }
        body.extend((col + values.len() as u16 - 1).to_le_bytes());
        Self {
            records: vec![(xls::MUL_RK, body)],
        }
    }

    pub(crate) fn formula_number(row: u16, col: u16, value: f64, style: u16) -> Self {
        let mut tail = value.to_le_bytes().to_vec();
        tail.extend([0u8; 8]);
        Self::new(xls::FORMULA, row, col, style, &tail)
    }

    /// A formula whose cached result is text, followed by its `STRING` record.
    pub(crate) fn formula_text(row: u16, col: u16, text: &str) -> Self {
        let mut cell = Self::new(xls::FORMULA, row, col, 0, &[0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0]);
        cell.records.push((xls::STRING, biff8_string(text)));
        cell
    }
}

/// A generated `.xls` workbook. Style index 1 is a date format, 2 a
/// date-time format and 3 a time format, as in [`xlsx_package`].
pub(crate) struct XlsFixture<'a> {
    pub(crate) sheets: Vec<(&'a str, Vec<XlsCell>)>,
    pub(crate) shared_strings: Vec<&'a str>,
    pub(crate) date1904: bool,
    pub(crate) encrypted: bool,
}

impl<'a> XlsFixture<'a> {
    pub(crate) fn new(sheets: Vec<(&'a str, Vec<XlsCell>)>) -> Self {
        Self {
            sheets,
            shared_strings: Vec::new(),
            date1904: false,
            encrypted: false,
        }
    }

    /// Numeric strings become `NUMBER` records, empty strings are skipped and
    /// everything else is a `LABEL`.
    pub(crate) fn from_grids(sheets: &[(&'a str, Vec<Vec<String>>)]) -> Self {
        let sheets = sheets
            .iter()
            .map(|(name, grid)| {
                let mut cells = Vec::new();
                for (row, values) in grid.iter().enumerate() {
                    for (col, value) in values.iter().enumerate() {
                        let (row, col) = (row as u16, col as u16);
                        if value.is_empty() {
                            continue;
                        } else if let Ok(number) = value.parse::<f64>() {
                            cells.push(XlsCell::number(row, col, number, 0));
                        } else {
                            cells.push(XlsCell::label(row, col, value));
                        }
                    }
                }
                (*name, cells)
            })
            .collect();
        Self::new(sheets)
    }

    /// The `Workbook` stream: globals, then one substream per sheet.
    pub(crate) fn stream(&self) -> Vec<u8> {
        let substreams: Vec<Vec<u8>> = self
            .sheets
            .iter()
            .map(|(_, cells)| {
                let mut stream = Vec::new();
                biff8_record(&mut stream, xls::BOF, &[0x00, 0x06, 0x10, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
                for cell in cells {
                    for (kind, body) in &cell.records {
                        biff8_record(&mut stream, *kind, body);
                    }
                }
                biff8_record(&mut stream, xls::EOF, &[]);
                stream
            })
            .collect();

        let globals = |offsets: &[u32]| {
            let mut stream = Vec::new();
            biff8_record(&mut stream, xls::BOF, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
            if self.encrypted {
                biff8_record(&mut stream, xls::FILE_PASS, &[1, 0, 1, 0, 1, 0]);
            }
            biff8_record(&mut stream, xls::CODE_PAGE, &1200u16.to_le_bytes());
            biff8_record(&mut stream, xls::DATE1904, &u16::from(self.date1904).to_le_bytes());
            let mut format = 164u16.to_le_bytes().to_vec();
            format.extend(biff8_string("yyyy\\-mm\\-dd\\ hh:mm"));
            biff8_record(&mut stream, xls::FORMAT, &format);
            for id in [0u16, 14, 164, 21] {
                let mut xf = vec![0u8; 20];
                xf[2..4].copy_from_slice(&id.to_le_bytes());
                biff8_record(&mut stream, xls::XF, &xf);
            }
            if !self.shared_strings.is_empty() {
                let count = self.shared_strings.len() as u32;
                let mut sst = count.to_le_bytes().to_vec();
                sst.extend(count.to_le_bytes());
                for string in &self.shared_strings {
                    sst.extend(biff8_string(string));
                }
                biff8_record(&mut stream, xls::SST, &sst);
            }
            for ((name, _), offset) in self.sheets.iter().zip(offsets) {
                let mut sheet = offset.to_le_bytes().to_vec();
                sheet.extend([0, 0, name.encode_utf16().count() as u8]);
                sheet.extend(biff8_characters(name));
                biff8_record(&mut stream, xls::BOUND_SHEET8, &sheet);
            }
            biff8_record(&mut stream, xls::EOF, &[]);
            stream
        };

        let mut offset = globals(&vec![0; self.sheets.len()]).len() as u32;
        let mut offsets = Vec::new();
        for substream in &substreams {
            offsets.push(offset);
            offset += substream.len() as u32;
        }
        let mut stream = globals(&offsets);
        for substream in substreams {
            stream.extend(substream);
        }
        stream
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let stream = self.stream();
        compound_file(&[("Workbook", stream.as_slice())])
    }
}
