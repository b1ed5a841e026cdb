use thiserror::Error;

/// Failures while turning uploaded bytes into tables.
///
/// Ingestion is all-or-nothing per file: any of these aborts the whole file and
/// leaves previously registered tables untouched.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{0}: {1}")]
    WithContext(String, Box<ParseError>),

    #[error("Cannot detect spreadsheet format of '{0}'")]
    UnsupportedFormat(String),

    #[error("OLE document '{0}' holds no workbook stream")]
    UnsupportedOleWorkbook(String),

    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtected(String),

    #[error("Spreadsheet '{0}' contains no sheets")]
    EmptyWorkbook(String),

    #[error("Missing part '{0}' in archive")]
    MissingPart(String),

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("Invalid cell value at '{sheet}!{reference}': {message}")]
    CellValue {
        sheet: String,
        reference: String,
        message: String,
    },

    #[error("Corrupted compound document: {0}")]
    CompoundFile(String),

    #[error("BIFF8 record ends before {0} more byte(s)")]
    RecordTooShort(usize),

    #[error("Invalid code page '{0}'")]
    CodePage(u16),

    #[error("Invalid formula value '{0:#018x}'")]
    FormulaValue(u64),

    #[error("Sheet '{sheet}' spans {cells} cells, more than the {limit} allowed")]
    SheetTooLarge {
        sheet: String,
        cells: usize,
        limit: usize,
    },

    #[error("Invalid ODS MIME type")]
    OdsMimeType,

    #[error("Parse entity '{0}' failed")]
    XmlEntity(String),

    #[error("Parse attribute value '{0}' failed")]
    XmlAttributeValue(String),

    #[error("Register table '{table}' failed: {source}")]
    Register {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    // Standard library errors
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{0}")]
    Utf8(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlEscape(#[from] quick_xml::escape::EscapeError),

    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for std::result::Result<T, ParseError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| ParseError::WithContext(message.to_owned(), Box::new(e)))
    }
}

/// Failure of a single `run_query` call.
///
/// The engine diagnostic is kept verbatim so the caller can show it next to the
/// offending SQL.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryExecutionError {
    #[error("{message}")]
    Engine { sql: String, message: String },

    #[error("Statement rejected: {reason}")]
    Rejected { sql: String, reason: String },

    #[error("Row limit must be a positive integer")]
    InvalidLimit,
}

impl QueryExecutionError {
    pub(crate) fn engine(sql: &str, error: duckdb::Error) -> Self {
        Self::Engine {
            sql: sql.to_owned(),
            message: error.to_string(),
        }
    }

    /// The statement that failed, after preprocessing.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Engine { sql, .. } | Self::Rejected { sql, .. } => Some(sql),
            Self::InvalidLimit => None,
        }
    }

    /// Diagnostic text for display.
    pub fn message(&self) -> String {
        match self {
            Self::Engine { message, .. } => message.to_owned(),
            Self::Rejected { reason, .. } => reason.to_owned(),
            Self::InvalidLimit => self.to_string(),
        }
    }
}

/// Crate-level error for everything outside the two core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Query(#[from] QueryExecutionError),

    #[error("Engine error: {0}")]
    Engine(#[from] duckdb::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
