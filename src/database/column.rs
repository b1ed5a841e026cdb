use serde::Serialize;

/// Storage type inferred for a column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    Timestamp,
    Date,
    Time,
}

/// A named, typed column of a table about to be registered.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) kind: ColumnType,
}

impl ColumnType {
    /// Type name used in `CREATE TABLE`.
    pub(crate) const fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
        }
    }

    /// Most specific type able to hold every candidate; missing values are
    /// ignored. Falls back to VARCHAR when the candidates disagree or there
    /// are none.
    pub(crate) fn detect(types: impl IntoIterator<Item = Option<ColumnType>>) -> ColumnType {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Varchar
        } else if types.iter().all(ColumnType::is_boolean) {
            ColumnType::Boolean
        } else if types.iter().all(ColumnType::is_int) {
            ColumnType::BigInt
        } else if types.iter().all(ColumnType::is_float) {
            ColumnType::Double
        } else if types.iter().all(ColumnType::is_date) {
            ColumnType::Date
        } else if types.iter().all(ColumnType::is_time) {
            ColumnType::Time
        } else if types.iter().all(ColumnType::is_datetime) {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    #[inline]
    pub(crate) fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    #[inline]
    pub(crate) fn is_int(&self) -> bool {
        matches!(self, ColumnType::BigInt)
    }

    /// Integers widen to doubles.
    #[inline]
    pub(crate) fn is_float(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }

    #[inline]
    pub(crate) fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    #[inline]
    pub(crate) fn is_time(&self) -> bool {
        matches!(self, ColumnType::Time)
    }

    #[inline]
    pub(crate) fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date | ColumnType::Time)
    }
}
