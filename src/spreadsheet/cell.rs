use crate::database::column::ColumnType;
use crate::database::value::Scalar;
use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use iso8601_duration::Duration as IsoDuration;
use std::fmt::Display;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Serial date origin of a workbook (`date1904` flag in xlsx).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum DateSystem {
    #[default]
    Excel1900,
    Excel1904,
}

/// How the raw text of a cell is to be read.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// `1`/`0`
    Boolean,
    Number,
    /// Serial number formatted with both date and time parts.
    SerialDateTime(DateSystem),
    SerialDate(DateSystem),
    SerialTime(DateSystem),
    /// `2024-01-31` or `2024-01-31T10:15:00`
    IsoDateTime,
    /// `PT10H15M00S`, used by ods time cells
    IsoDuration,
    Text,
    /// Index into the workbook's shared string table, resolved by the reader.
    SharedString,
    Error,
}

impl CellType {
    /// Classifies built-in number format ids that denote dates or times.
    pub(crate) fn parse_builtin_number_format_id(id: &str, system: DateSystem) -> Option<Self> {
        match id {
            "22" => Some(Self::SerialDateTime(system)),
            "14" | "15" | "16" | "17" => Some(Self::SerialDate(system)),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(Self::SerialTime(system)),
            _ => None,
        }
    }

    /// Classifies a custom format code by the date and time tokens it contains
    /// outside quoted literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, system: DateSystem) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time) {
            (true, true) => Self::SerialDateTime(system),
            (true, false) => Self::SerialDate(system),
            (false, true) => Self::SerialTime(system),
            (false, false) => Self::Number,
        }
    }
}

/// A non-empty cell in a sheet.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    /// 0-based
    pub(crate) row: usize,
    /// 0-based
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    pub(crate) fn new(row: usize, col: usize, kind: CellType, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            kind,
            value: value.into(),
        }
    }

    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Narrowest column type able to hold this cell, `None` for cells that
    /// carry no value. A value its format cannot convert, such as a negative
    /// date serial, is text.
    pub(crate) fn column_type(&self) -> Option<ColumnType> {
        match self.format_type() {
            Some(kind) if kind != ColumnType::Varchar && self.to_scalar(kind).is_err() => Some(ColumnType::Varchar),
            kind => kind,
        }
    }

    /// Column type implied by the cell's format alone.
    fn format_type(&self) -> Option<ColumnType> {
        match self.kind {
            CellType::Empty | CellType::Error => None,
            CellType::Boolean => Some(ColumnType::Boolean),
            CellType::Number => match self.value.parse::<f64>() {
                Ok(number) if is_integral(number) => Some(ColumnType::BigInt),
                Ok(_) => Some(ColumnType::Double),
                Err(_) => Some(ColumnType::Varchar),
            },
            CellType::SerialDateTime(_) => Some(ColumnType::Timestamp),
            CellType::SerialDate(_) => Some(ColumnType::Date),
            CellType::SerialTime(_) => Some(ColumnType::Time),
            CellType::IsoDateTime if !self.value.contains('T') => Some(ColumnType::Date),
            CellType::IsoDateTime if self.value.contains("T00:00:00") => Some(ColumnType::Date),
            CellType::IsoDateTime => Some(ColumnType::Timestamp),
            CellType::IsoDuration => Some(ColumnType::Time),
            CellType::Text | CellType::SharedString => Some(ColumnType::Varchar),
        }
    }

    /// Reads the cell as a value of the given column type.
    pub(crate) fn to_scalar(&self, kind: ColumnType) -> Result<Scalar, String> {
        if matches!(self.kind, CellType::Empty | CellType::Error) {
            return Ok(Scalar::Null);
        }
        let scalar = match kind {
            ColumnType::Boolean => Scalar::Boolean(self.to_boolean()),
            ColumnType::BigInt => Scalar::Integer(self.to_bigint()?),
            ColumnType::Double => Scalar::Float(self.to_double()?),
            ColumnType::Varchar => Scalar::Text(self.to_string()),
            ColumnType::Date => Scalar::Date(self.to_date()?),
            ColumnType::Time => Scalar::Time(self.to_time()?),
            ColumnType::Timestamp => Scalar::Timestamp(self.to_datetime()?),
        };
        Ok(scalar)
    }

    fn to_boolean(&self) -> bool {
        self.value == "1" || self.value.eq_ignore_ascii_case("true")
    }

    fn to_bigint(&self) -> Result<i64, String> {
        if let Ok(integer) = self.value.parse::<i64>() {
            return Ok(integer);
        }
        match self.to_double() {
            Ok(number) if is_integral(number) => Ok(number as i64),
            _ => Err(format!("parse '{}' to bigint failed", self.value)),
        }
    }

    fn to_double(&self) -> Result<f64, String> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    fn to_date(&self) -> Result<NaiveDate, String> {
        self.to_datetime().map(|datetime| datetime.date())
    }

    fn to_time(&self) -> Result<NaiveTime, String> {
        match self.kind {
            CellType::SerialDateTime(_) | CellType::SerialDate(_) | CellType::SerialTime(_) | CellType::Number => {
                let fraction = self.to_double()?.fract();
                micros_to_time((fraction * MICROS_PER_DAY as f64).round() as i64)
                    .ok_or_else(|| format!("parse '{}' to time failed", self.value))
            }
            CellType::IsoDuration => {
                let duration = self
                    .value
                    .parse::<IsoDuration>()
                    .map_err(|_| format!("parse '{}' to iso8601 duration failed", self.value))?;
                let seconds = duration.hour as f64 * 3600.0 + duration.minute as f64 * 60.0 + duration.second as f64;
                micros_to_time((seconds * 1_000_000f64).round() as i64)
                    .ok_or_else(|| format!("time '{}' is out of range", self.value))
            }
            _ => self.to_datetime().map(|datetime| datetime.time()),
        }
    }

    fn to_datetime(&self) -> Result<NaiveDateTime, String> {
        match self.kind {
            CellType::SerialDateTime(system) | CellType::SerialDate(system) | CellType::SerialTime(system) => {
                serial_to_datetime(self.to_double()?, system)
                    .ok_or_else(|| format!("serial '{}' is not a valid date", self.value))
            }
            CellType::IsoDateTime => parse_iso_datetime(&self.value)
                .ok_or_else(|| format!("parse '{}' to datetime failed", self.value)),
            CellType::IsoDuration => {
                let time = self.to_time()?;
                Ok(NaiveDate::from_ymd_opt(1899, 12, 30)
                    .ok_or_else(|| "invalid epoch".to_owned())?
                    .and_time(time))
            }
            _ => Err(format!("parse '{}' to datetime failed", self.value)),
        }
    }
}

impl Display for Cell {
    /// Text rendering used when a column falls back to VARCHAR. Values that do
    /// not convert are shown raw.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            CellType::Boolean => write!(f, "{}", self.to_boolean()),
            CellType::SerialDateTime(_) => match self.to_datetime() {
                Ok(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
                Err(_) => write!(f, "{}", self.value),
            },
            CellType::SerialDate(_) => match self.to_date() {
                Ok(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                Err(_) => write!(f, "{}", self.value),
            },
            CellType::SerialTime(_) | CellType::IsoDuration => match self.to_time() {
                Ok(time) => write!(f, "{}", time.format("%H:%M:%S")),
                Err(_) => write!(f, "{}", self.value),
            },
            CellType::IsoDateTime => write!(f, "{}", self.value.replace('T', " ")),
            _ => write!(f, "{}", self.value),
        }
    }
}

fn is_integral(number: f64) -> bool {
    number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e15
}

fn micros_to_time(micros: i64) -> Option<NaiveTime> {
    if micros < 0 {
        return None;
    }
    let micros = micros % MICROS_PER_DAY;
    NaiveTime::from_num_seconds_from_midnight_opt(
        (micros / 1_000_000) as u32,
        (micros % 1_000_000) as u32 * 1_000,
    )
}

/// Converts a spreadsheet serial number to a timestamp. Serials below 60 in
/// the 1900 system are shifted by a day to undo the Lotus 1-2-3 leap year bug.
pub(crate) fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = match system {
        DateSystem::Excel1900 if days < 60 => 1,
        DateSystem::Excel1900 => 0,
        DateSystem::Excel1904 => 1_462,
    };
    let micros = (serial.fract() * MICROS_PER_DAY as f64).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_days(days.checked_add(offset)?)?)?
        .checked_add_signed(Duration::microseconds(micros))
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim_end_matches('Z');
    if value.contains('T') {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
}
