//! Part lookup inside the zip containers used by xlsx and ods.

use crate::error::ParseError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Finds a part by name, ignoring ASCII case and path separator style.
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, ParseError>;

    fn contains(&self, name: &str) -> bool;

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, ParseError>;

    /// Like [`ZipHelper::xml_reader`], but a missing part is an error.
    fn required_xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<XmlReader<BufReader<ZipFile<'_, RS>>>, ParseError> {
        self.xml_reader(name)?
            .ok_or_else(|| ParseError::MissingPart(name.to_owned()))
    }

    fn read_to_string(&mut self, name: &str) -> Result<Option<String>, ParseError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, ParseError> {
        let path = match find_name(self, name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match self.by_name(&path) {
            Ok(file) => Ok(Some(file)),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn contains(&self, name: &str) -> bool {
        find_name(self, name).is_some()
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, ParseError> {
        Ok(self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file))))
    }

    fn read_to_string(&mut self, name: &str) -> Result<Option<String>, ParseError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(Some(content))
            }
            None => Ok(None),
        }
    }
}

fn find_name<RS: Read + Seek>(zip: &ZipArchive<RS>, name: &str) -> Option<String> {
    let pattern = name.replace('\\', "/");
    zip.file_names()
        .find(|file_name| pattern.eq_ignore_ascii_case(&file_name.replace('\\', "/")))
        .map(|file_name| file_name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/workbook.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<workbook/>").unwrap();
        writer.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"text/plain").unwrap();
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn lookup_ignores_case_and_separators() {
        let mut zip = archive();
        assert!(zip.contains("XL/Workbook.xml"));
        assert!(zip.contains("xl\\workbook.xml"));
        assert!(!zip.contains("xl/styles.xml"));
        assert!(zip.file("xl/styles.xml").unwrap().is_none());
    }

    #[test]
    fn reads_parts_as_text() {
        let mut zip = archive();
        assert_eq!(zip.read_to_string("mimetype").unwrap().as_deref(), Some("text/plain"));
        assert!(zip.read_to_string("content.xml").unwrap().is_none());
    }

    #[test]
    fn required_part_reports_its_name() {
        let mut zip = archive();
        let error = zip.required_xml_reader("xl/sharedStrings.xml").err().unwrap();
        assert_eq!(error.to_string(), "Missing part 'xl/sharedStrings.xml' in archive");
    }
}
