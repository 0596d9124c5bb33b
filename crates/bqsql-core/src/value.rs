//! Native and generic value models
//!
//! [`NativeValue`] is the warehouse's own representation of a cell after wire
//! decoding. [`GenericValue`] is what relational consumers receive; the
//! converter in [`crate::convert`] maps one onto the other.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

/// Cell value in the warehouse's native representation
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Int(i64),
    Float(f64),
    /// Exact decimal text of a NUMERIC or BIGNUMERIC value
    Numeric(String),
    String(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Interval(IntervalValue),
    Range(RangeValue),
    /// Record children, positionally matching the record's child fields
    Record(Vec<NativeValue>),
    /// Elements of a repeated field
    Array(Vec<NativeValue>),
}

impl NativeValue {
    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Numeric(_) => "numeric",
            Self::String(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::Interval(_) => "interval",
            Self::Range(_) => "range",
            Self::Record(_) => "record",
            Self::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Warehouse INTERVAL value
///
/// Components are stored as returned, without canonicalisation. A negative
/// interval carries the sign on each non-zero component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalValue {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub sub_second_nanos: i32,
}

impl fmt::Display for IntervalValue {
    /// Canonical `Y-M D H:M:S[.F]` text, fraction trimmed of trailing zeros
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {} {}:{}:{}",
            self.years,
            self.months.unsigned_abs(),
            self.days,
            self.hours,
            self.minutes.unsigned_abs(),
            self.seconds.unsigned_abs()
        )?;

        if self.sub_second_nanos != 0 {
            let mantissa = format!("{:09}", self.sub_second_nanos.unsigned_abs());
            write!(f, ".{}", mantissa.trim_end_matches('0'))?;
        }

        Ok(())
    }
}

/// Warehouse RANGE value, half-open `[start, end)`
///
/// `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    pub start: Option<Box<NativeValue>>,
    pub end: Option<Box<NativeValue>>,
}

impl RangeValue {
    pub fn new(start: Option<NativeValue>, end: Option<NativeValue>) -> Self {
        Self {
            start: start.map(Box::new),
            end: end.map(Box::new),
        }
    }
}

/// Cell value handed to relational consumers
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// Instant with nanosecond precision
    Timestamp(DateTime<Utc>),
    /// Converted record, keyed by child name in schema order
    Record(Record),
    /// Converted repeated record; `Null` elements keep their position
    Sequence(Vec<GenericValue>),
}

impl GenericValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[GenericValue]> {
        match self {
            Self::Sequence(v) => Some(v),
            _ => None,
        }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail: keys are strings and
        // non-finite floats are written as null.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for GenericValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Timestamp(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Record(record) => record.serialize(serializer),
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Ordered mapping from child field name to converted value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, GenericValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry, keeping insertion order
    pub fn push(&mut self, name: impl Into<String>, value: GenericValue) {
        self.entries.push((name.into(), value));
    }

    /// Look up a child value by name
    pub fn get(&self, name: &str) -> Option<&GenericValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Child names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GenericValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_display() {
        let iv = IntervalValue { sub_second_nanos: 1000, ..Default::default() };
        assert_eq!(iv.to_string(), "0-0 0 0:0:0.000001");

        let iv = IntervalValue { years: 1, sub_second_nanos: 2000, ..Default::default() };
        assert_eq!(iv.to_string(), "1-0 0 0:0:0.000002");

        let iv = IntervalValue { years: 1, months: 2, days: 3, hours: 4, minutes: 5, seconds: 6, sub_second_nanos: 0 };
        assert_eq!(iv.to_string(), "1-2 3 4:5:6");

        let iv = IntervalValue { hours: -10, minutes: -20, seconds: -30, sub_second_nanos: -500_000_000, ..Default::default() };
        assert_eq!(iv.to_string(), "0-0 0 -10:20:30.5");
    }

    #[test]
    fn test_record_serializes_in_insertion_order() {
        let mut record = Record::new();
        record.push("zeta", GenericValue::Int(1));
        record.push("alpha", GenericValue::Null);
        record.push("mid", GenericValue::String("x".into()));

        let json = GenericValue::Record(record).to_json();
        assert_eq!(json, r#"{"zeta":1,"alpha":null,"mid":"x"}"#);
    }

    #[test]
    fn test_timestamp_serializes_with_nanos() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 45).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(
            GenericValue::Timestamp(ts).to_json(),
            r#""2023-12-25T10:30:45.123456789Z""#
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(GenericValue::Int(3).as_i64(), Some(3));
        assert_eq!(GenericValue::Int(3).as_f64(), None);
        assert_eq!(GenericValue::String("a".into()).as_str(), Some("a"));
        assert!(GenericValue::Null.is_null());
        assert_eq!(NativeValue::Array(vec![]).kind(), "array");
    }
}
