//! Wire decoding
//!
//! The warehouse REST API returns rows as `{"f": [{"v": ...}, ...]}` with
//! every scalar encoded as a string, repeated values as `[{"v": ...}]` and
//! records as nested `{"f": [...]}` objects. This module turns such cells
//! into [`NativeValue`]s using the result schema.

use crate::error::{DriverError, Result};
use crate::schema::{FieldSchema, TypeTag};
use crate::value::{IntervalValue, NativeValue, RangeValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

/// Decode one wire row against the result schema
pub fn decode_row(row: &Value, schema: &[FieldSchema]) -> Result<Vec<NativeValue>> {
    let cells = row
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| DriverError::Conversion("row is missing its 'f' cell list".to_string()))?;

    if cells.len() != schema.len() {
        return Err(DriverError::SchemaDrift(format!(
            "row has {} cells but the schema declares {} columns",
            cells.len(),
            schema.len()
        )));
    }

    cells
        .iter()
        .zip(schema)
        .map(|(cell, field)| decode_cell(cell_value(cell), field))
        .collect()
}

/// Decode one wire cell value against its field schema
pub fn decode_cell(value: &Value, field: &FieldSchema) -> Result<NativeValue> {
    if value.is_null() {
        return Ok(NativeValue::Null);
    }

    if field.repeated {
        let elements = value
            .as_array()
            .ok_or_else(|| shape_error(field, "an array", value))?;

        return elements
            .iter()
            .map(|element| decode_single(cell_value(element), field))
            .collect::<Result<Vec<_>>>()
            .map(NativeValue::Array);
    }

    decode_single(value, field)
}

/// Unwrap `{"v": x}` to `x`; anything else is returned as-is
fn cell_value(cell: &Value) -> &Value {
    match cell {
        Value::Object(map) if map.len() == 1 && map.contains_key("v") => &map["v"],
        other => other,
    }
}

fn decode_single(value: &Value, field: &FieldSchema) -> Result<NativeValue> {
    if value.is_null() {
        return Ok(NativeValue::Null);
    }

    if field.is_record() {
        let cells = value
            .get("f")
            .and_then(Value::as_array)
            .ok_or_else(|| shape_error(field, "a record", value))?;

        if cells.len() != field.fields.len() {
            return Err(DriverError::SchemaDrift(format!(
                "record '{}' has {} values but the schema declares {} fields",
                field.name,
                cells.len(),
                field.fields.len()
            )));
        }

        return cells
            .iter()
            .zip(&field.fields)
            .map(|(cell, child)| decode_cell(cell_value(cell), child))
            .collect::<Result<Vec<_>>>()
            .map(NativeValue::Record);
    }

    let text = scalar_string(value).ok_or_else(|| shape_error(field, "a scalar", value))?;
    decode_text(&text, &field.type_tag, field)
}

/// Wire scalars are strings, but tolerate bare JSON numbers and booleans
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn decode_text(text: &str, type_tag: &TypeTag, field: &FieldSchema) -> Result<NativeValue> {
    let invalid = || {
        DriverError::Conversion(format!(
            "column '{}' holds invalid {} value '{}'",
            field.name, type_tag, text
        ))
    };

    let value = match type_tag {
        TypeTag::Integer => NativeValue::Int(text.trim().parse().map_err(|_| invalid())?),
        TypeTag::Float => NativeValue::Float(parse_float(text).ok_or_else(invalid)?),
        TypeTag::Numeric | TypeTag::BigNumeric => {
            if text.trim().parse::<f64>().is_err() {
                return Err(invalid());
            }
            NativeValue::Numeric(text.trim().to_string())
        }
        TypeTag::String | TypeTag::Geography | TypeTag::Json => NativeValue::String(text.to_string()),
        TypeTag::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => NativeValue::Bool(true),
            "false" => NativeValue::Bool(false),
            _ => return Err(invalid()),
        },
        TypeTag::Date => NativeValue::Date(
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| invalid())?,
        ),
        TypeTag::DateTime => NativeValue::DateTime(parse_datetime(text).ok_or_else(invalid)?),
        TypeTag::Time => NativeValue::Time(
            NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f").map_err(|_| invalid())?,
        ),
        TypeTag::Timestamp => NativeValue::Timestamp(parse_timestamp(text).ok_or_else(invalid)?),
        TypeTag::Interval => NativeValue::Interval(parse_interval(text).ok_or_else(invalid)?),
        TypeTag::Range => {
            let element = field.range_element.clone().unwrap_or(TypeTag::Date);
            NativeValue::Range(parse_range(text, &element, field)?)
        }
        // Records are handled by the caller; unknown types pass through as
        // text so the converter can report them.
        TypeTag::Record | TypeTag::Unsupported(_) => NativeValue::String(text.to_string()),
    };

    Ok(value)
}

fn parse_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Parse a TIMESTAMP cell
///
/// The REST API encodes timestamps as epoch seconds, usually in scientific
/// notation (`1.703500245123456E9`). The digits are shifted exactly rather
/// than going through `f64`, which would lose microseconds. RFC 3339 text
/// is accepted as well.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    let lower = text.to_ascii_lowercase();
    let (mantissa, exponent) = match lower.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().ok()?),
        None => (lower.as_str(), 0),
    };

    let negative = mantissa.starts_with('-');
    let mantissa = mantissa.trim_start_matches(['-', '+']);
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let digits = format!("{}{}", int_part, frac_part);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = digits.trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    if digits.len() > 30 {
        return None;
    }

    // value = digits * 10^(exponent - frac_len) seconds, scaled to nanos
    let frac_len = i32::try_from(frac_part.len()).ok()?;
    let scale = exponent.checked_sub(frac_len)?.checked_add(9)?;
    let mut nanos: i128 = digits.parse().ok()?;
    if scale >= 0 {
        nanos = nanos.checked_mul(10i128.checked_pow(scale.unsigned_abs())?)?;
    } else if scale < -38 {
        nanos = 0;
    } else {
        nanos /= 10i128.pow(scale.unsigned_abs());
    }
    if negative {
        nanos = -nanos;
    }

    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
    let sub = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, sub)
}

/// Parse canonical interval text `[-]Y-M [-]D [-]H:M:S[.F]`
///
/// Every component is an unsigned digit run after its sign, so values that
/// do not fit an `i32` are rejected rather than wrapped.
pub fn parse_interval(text: &str) -> Option<IntervalValue> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }

    let (ym_negative, ym) = split_sign(parts[0]);
    let (years, months) = ym.split_once('-')?;
    let ym_sign = if ym_negative { -1 } else { 1 };

    let (days_negative, days) = split_sign(parts[1]);
    let days = if days_negative { -unsigned(days)? } else { unsigned(days)? };

    let (time_negative, hms) = split_sign(parts[2]);
    let mut hms_parts = hms.splitn(3, ':');
    let hours = unsigned(hms_parts.next()?)?;
    let minutes = unsigned(hms_parts.next()?)?;
    let seconds_text = hms_parts.next()?;
    let (seconds, fraction) = seconds_text.split_once('.').unwrap_or((seconds_text, ""));
    let seconds = unsigned(seconds)?;

    let sub_second_nanos = if fraction.is_empty() {
        0
    } else {
        if fraction.len() > 9 {
            return None;
        }
        unsigned(&format!("{:0<9}", fraction))?
    };
    let time_sign = if time_negative { -1 } else { 1 };

    Some(IntervalValue {
        years: ym_sign * unsigned(years)?,
        months: ym_sign * unsigned(months)?,
        days,
        hours: time_sign * hours,
        minutes: time_sign * minutes,
        seconds: time_sign * seconds,
        sub_second_nanos: time_sign * sub_second_nanos,
    })
}

fn split_sign(text: &str) -> (bool, &str) {
    match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    }
}

/// Non-empty ASCII digits fitting a non-negative `i32`
fn unsigned(text: &str) -> Option<i32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parse range text `[start, end)`; `UNBOUNDED` or `NULL` bounds are open
fn parse_range(text: &str, element: &TypeTag, field: &FieldSchema) -> Result<RangeValue> {
    let invalid = || {
        DriverError::Conversion(format!(
            "column '{}' holds invalid RANGE value '{}'",
            field.name, text
        ))
    };

    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let (start, end) = inner.split_once(',').ok_or_else(invalid)?;

    let bound = |raw: &str| -> Result<Option<NativeValue>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("UNBOUNDED") || raw.eq_ignore_ascii_case("NULL") {
            Ok(None)
        } else {
            decode_text(raw, element, field).map(Some)
        }
    };

    Ok(RangeValue::new(bound(start)?, bound(end)?))
}

fn shape_error(field: &FieldSchema, expected: &str, actual: &Value) -> DriverError {
    let kind = match actual {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    DriverError::Conversion(format!(
        "column '{}' expected {} on the wire, got {}",
        field.name, expected, kind
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    #[test]
    fn test_decode_scalars() {
        let int = FieldSchema::new("i", TypeTag::Integer);
        assert_eq!(decode_cell(&json!("42"), &int).unwrap(), NativeValue::Int(42));

        let float = FieldSchema::new("f", TypeTag::Float);
        assert_eq!(decode_cell(&json!("1.5"), &float).unwrap(), NativeValue::Float(1.5));
        assert!(matches!(decode_cell(&json!("NaN"), &float).unwrap(), NativeValue::Float(v) if v.is_nan()));

        let num = FieldSchema::new("n", TypeTag::Numeric);
        assert_eq!(
            decode_cell(&json!("11.111111111"), &num).unwrap(),
            NativeValue::Numeric("11.111111111".to_string())
        );

        let b = FieldSchema::new("b", TypeTag::Boolean);
        assert_eq!(decode_cell(&json!("true"), &b).unwrap(), NativeValue::Bool(true));
        assert!(decode_cell(&json!("yes"), &b).is_err());
    }

    #[test]
    fn test_decode_timestamp_keeps_microseconds() {
        let ts = parse_timestamp("1.703500245123456E9").unwrap();
        assert_eq!(ts.timestamp(), 1_703_500_245);
        assert_eq!(ts.nanosecond(), 123_456_000);

        let ts = parse_timestamp("1703500245").unwrap();
        assert_eq!(ts, Utc.timestamp_opt(1_703_500_245, 0).unwrap());

        let ts = parse_timestamp("-1.5E0").unwrap();
        assert_eq!(ts.timestamp(), -2);
        assert_eq!(ts.nanosecond(), 500_000_000);

        let ts = parse_timestamp("2023-12-25T10:30:45.123456789Z").unwrap();
        assert_eq!(ts.nanosecond(), 123_456_789);

        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn test_parse_interval() {
        let iv = parse_interval("0-0 0 0:0:0.000001").unwrap();
        assert_eq!(iv.sub_second_nanos, 1000);
        assert_eq!(iv.to_string(), "0-0 0 0:0:0.000001");

        let iv = parse_interval("-1-2 3 -4:5:6.5").unwrap();
        assert_eq!((iv.years, iv.months, iv.days), (-1, -2, 3));
        assert_eq!((iv.hours, iv.minutes, iv.seconds), (-4, -5, -6));
        assert_eq!(iv.sub_second_nanos, -500_000_000);

        assert!(parse_interval("1-2 3").is_none());
    }

    #[test]
    fn test_parse_interval_rejects_out_of_range_components() {
        assert!(parse_interval("0--2147483648 0 0:0:0").is_none());
        assert!(parse_interval("0-0 0 0:0:99999999999").is_none());
        assert!(parse_interval("0-+1 0 0:0:0").is_none());

        let iv = parse_interval("0-0 -2147483647 0:0:0").unwrap();
        assert_eq!(iv.days, -2_147_483_647);
    }

    #[test]
    fn test_interval_display_with_extreme_components() {
        let iv = IntervalValue {
            months: i32::MIN,
            minutes: i32::MIN,
            seconds: i32::MIN,
            sub_second_nanos: i32::MIN,
            ..Default::default()
        };
        assert_eq!(iv.to_string(), "0-2147483648 0 0:2147483648:2147483648.2147483648");
    }

    #[test]
    fn test_timestamp_with_huge_exponent_is_rejected() {
        assert!(parse_timestamp("1e2147483647").is_none());
        assert!(parse_timestamp("1e-2147483648").is_some());
        assert!(parse_timestamp("1.5e-2147483647").is_some());

        let field = FieldSchema::new("ts", TypeTag::Timestamp);
        let err = decode_cell(&json!("1e2147483647"), &field).unwrap_err();
        assert!(matches!(err, DriverError::Conversion(_)));
    }

    #[test]
    fn test_decode_range() {
        let field = FieldSchema::new("r", TypeTag::Range).with_range_element(TypeTag::Date);
        let value = decode_cell(&json!("[2024-01-01, UNBOUNDED)"), &field).unwrap();
        match value {
            NativeValue::Range(range) => {
                assert!(range.start.is_some());
                assert!(range.end.is_none());
            }
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_repeated_and_record() {
        let field = FieldSchema::record(
            "r",
            vec![
                FieldSchema::new("a", TypeTag::Integer),
                FieldSchema::new("tags", TypeTag::String).repeated(),
            ],
        )
        .repeated();

        let wire = json!([
            {"v": {"f": [{"v": "1"}, {"v": [{"v": "x"}, {"v": "y"}]}]}},
            {"v": null}
        ]);

        let value = decode_cell(&wire, &field).unwrap();
        assert_eq!(
            value,
            NativeValue::Array(vec![
                NativeValue::Record(vec![
                    NativeValue::Int(1),
                    NativeValue::Array(vec![
                        NativeValue::String("x".into()),
                        NativeValue::String("y".into()),
                    ]),
                ]),
                NativeValue::Null,
            ])
        );
    }

    #[test]
    fn test_decode_row_width_mismatch() {
        let schema = vec![FieldSchema::new("a", TypeTag::Integer)];
        let err = decode_row(&json!({"f": [{"v": "1"}, {"v": "2"}]}), &schema).unwrap_err();
        assert!(matches!(err, DriverError::SchemaDrift(_)));
    }

    #[test]
    fn test_decode_record_arity_mismatch() {
        let field = FieldSchema::record("r", vec![FieldSchema::new("a", TypeTag::Integer)]);
        let err = decode_cell(&json!({"f": [{"v": "1"}, {"v": "2"}]}), &field).unwrap_err();
        assert!(matches!(err, DriverError::SchemaDrift(_)));
    }
}
