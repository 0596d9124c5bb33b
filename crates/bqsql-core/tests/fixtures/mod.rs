//! Test fixtures for value conversion tests
//!
//! Reusable record schemas and native values shaped like the rows the
//! warehouse returns for nested and repeated columns.

use bqsql_core::{FieldSchema, NativeValue, TypeTag};
use chrono::{NaiveDate, NaiveTime};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

/// Five scalar children: int, float, string, time, datetime
pub fn scalar_children(prefix: &str) -> Vec<FieldSchema> {
    vec![
        FieldSchema::new(format!("{}1", prefix), TypeTag::parse("INT")),
        FieldSchema::new(format!("{}2", prefix), TypeTag::parse("FLOAT64")),
        FieldSchema::new(format!("{}3", prefix), TypeTag::String),
        FieldSchema::new(format!("{}4", prefix), TypeTag::Time),
        FieldSchema::new(format!("{}5", prefix), TypeTag::DateTime),
    ]
}

/// Native values matching [`scalar_children`]
pub fn scalar_values(n: i64, f: f64, text: &str, t: NaiveTime, dt_date: NaiveDate) -> Vec<NativeValue> {
    vec![
        NativeValue::Int(n),
        NativeValue::Float(f),
        NativeValue::String(text.to_string()),
        NativeValue::Time(t),
        NativeValue::DateTime(dt_date.and_time(time(1, 1, 1))),
    ]
}

/// Record with five scalar children and a nested sixth record child
pub fn nested_record_schema() -> FieldSchema {
    let mut children = scalar_children("col");
    children.push(FieldSchema::record("col6", scalar_children("nested")));
    FieldSchema::record("rec", children)
}

pub fn nested_record_value() -> NativeValue {
    let mut values = scalar_values(1, 1.99999, "text value", time(1, 1, 1), date(2019, 1, 1));
    values.push(NativeValue::Record(scalar_values(
        1,
        1.99999,
        "text value",
        time(1, 1, 1),
        date(2019, 1, 1),
    )));
    NativeValue::Record(values)
}

/// Repeated record with five scalar children
pub fn repeated_record_schema() -> FieldSchema {
    FieldSchema::record("recs", scalar_children("col")).repeated()
}

pub fn second_record_value() -> NativeValue {
    NativeValue::Record(scalar_values(2, 2.99999, "text value 2", time(2, 2, 2), date(2019, 2, 2)))
}
