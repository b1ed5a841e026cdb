use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use duckdb::types::TimeUnit;
use duckdb::types::Value;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use std::fmt::Display;

/// A single typed cell or result value.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Boolean(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => write!(f, "{value}"),
            Scalar::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Scalar::Time(value) => write!(f, "{}", value.format("%H:%M:%S%.f")),
            Scalar::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// Plain JSON scalars: temporal values as ISO 8601 strings, NaN and
/// infinities as `null`.
impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Boolean(value) => serializer.serialize_bool(*value),
            Scalar::Integer(value) => serializer.serialize_i64(*value),
            Scalar::Float(value) if value.is_finite() => serializer.serialize_f64(*value),
            Scalar::Float(_) => serializer.serialize_none(),
            Scalar::Text(value) => serializer.serialize_str(value),
            Scalar::Date(_) | Scalar::Time(_) | Scalar::Timestamp(_) => serializer.collect_str(self),
        }
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

impl From<&Scalar> for Value {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Boolean(value) => Value::Boolean(*value),
            Scalar::Integer(value) => Value::BigInt(*value),
            Scalar::Float(value) => Value::Double(*value),
            Scalar::Text(value) => Value::Text(value.to_owned()),
            Scalar::Date(value) => Value::Date32((*value - epoch()).num_days() as i32),
            Scalar::Time(value) => {
                let micros = (*value - NaiveTime::MIN).num_microseconds().unwrap_or_default();
                Value::Time64(TimeUnit::Microsecond, micros)
            }
            Scalar::Timestamp(value) => Value::Timestamp(TimeUnit::Microsecond, value.and_utc().timestamp_micros()),
        }
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Boolean(value) => Scalar::Boolean(value),
            Value::TinyInt(value) => Scalar::Integer(value.into()),
            Value::SmallInt(value) => Scalar::Integer(value.into()),
            Value::Int(value) => Scalar::Integer(value.into()),
            Value::BigInt(value) => Scalar::Integer(value),
            Value::UTinyInt(value) => Scalar::Integer(value.into()),
            Value::USmallInt(value) => Scalar::Integer(value.into()),
            Value::UInt(value) => Scalar::Integer(value.into()),
            Value::UBigInt(value) => i64::try_from(value)
                .map(Scalar::Integer)
                .unwrap_or(Scalar::Float(value as f64)),
            Value::HugeInt(value) => i64::try_from(value)
                .map(Scalar::Integer)
                .unwrap_or(Scalar::Float(value as f64)),
            Value::Float(value) => Scalar::Float(value.into()),
            Value::Double(value) => Scalar::Float(value),
            Value::Decimal(value) => {
                let text = value.to_string();
                text.parse::<f64>().map(Scalar::Float).unwrap_or(Scalar::Text(text))
            }
            Value::Text(value) => Scalar::Text(value),
            Value::Enum(value) => Scalar::Text(value),
            Value::Date32(days) => epoch()
                .checked_add_signed(Duration::days(days.into()))
                .map(Scalar::Date)
                .unwrap_or(Scalar::Null),
            Value::Time64(unit, value) => {
                let micros = to_micros(unit, value);
                u32::try_from(micros / 1_000_000)
                    .ok()
                    .zip(u32::try_from(micros % 1_000_000).ok())
                    .and_then(|(seconds, micros)| NaiveTime::from_num_seconds_from_midnight_opt(seconds, micros * 1_000))
                    .map(Scalar::Time)
                    .unwrap_or(Scalar::Null)
            }
            Value::Timestamp(unit, value) => DateTime::from_timestamp_micros(to_micros(unit, value))
                .map(|datetime| Scalar::Timestamp(datetime.naive_utc()))
                .unwrap_or(Scalar::Null),
            other => Scalar::Text(format!("{other:?}")),
        }
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Name-keyed values in insertion order, serialized as a JSON object.
///
/// Inserting an existing name replaces its value in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Fields<T>(Vec<(String, T)>);

/// One row keyed by column name.
pub type Record = Fields<Scalar>;

impl<T> Default for Fields<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Fields<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<T> FromIterator<(String, T)> for Fields<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

impl<T: Serialize> Serialize for Fields<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
