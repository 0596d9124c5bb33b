//! Text formatting for scalar values
//!
//! Repeated scalar columns and range bounds are rendered as text. These
//! helpers fix that text so it stays stable for downstream consumers.

use crate::value::{NativeValue, RangeValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Text used for a missing range bound
pub const UNBOUNDED: &str = "UNBOUNDED";

/// Text used for a null element inside a flattened repeated column
pub const NULL_TEXT: &str = "NULL";

pub fn date_text(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn datetime_text(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn time_text(time: &NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Default textual form of an instant
///
/// `2023-12-25 10:30:45.5 +0000 UTC`: the fraction is dropped when zero and
/// otherwise trimmed of trailing zeros.
pub fn timestamp_text(ts: &DateTime<Utc>) -> String {
    let mut out = ts.format("%Y-%m-%d %H:%M:%S").to_string();

    let nanos = ts.timestamp_subsec_nanos();
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    out.push_str(" +0000 UTC");
    out
}

/// Default numeric text of a float
///
/// Shortest round-trip digits. Exponent form is used when the decimal
/// exponent is below -4 or at least the shortest precision (capped at 6),
/// so `2.34e12` prints as `2.34e+12` and `1.99999` prints unchanged.
pub fn float_text(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => match e.parse::<i32>() {
            Ok(exp) => (m, exp),
            Err(_) => return value.to_string(),
        },
        None => return value.to_string(),
    };

    let digits = mantissa.chars().filter(|c| c.is_ascii_digit()).count() as i32;
    let mut precision = 6;
    if precision > digits && digits >= exponent + 1 {
        precision = digits;
    }

    if exponent < -4 || exponent >= precision {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        value.to_string()
    }
}

/// Text of an exact decimal, via its float approximation
pub fn numeric_text(decimal: &str) -> Option<String> {
    decimal.trim().parse::<f64>().ok().map(float_text)
}

/// Half-open interval text `[start,end)`
pub fn range_text(range: &RangeValue) -> String {
    let bound = |b: &Option<Box<NativeValue>>| match b {
        Some(v) if !v.is_null() => scalar_text(v).unwrap_or_else(|| UNBOUNDED.to_string()),
        _ => UNBOUNDED.to_string(),
    };
    format!("[{},{})", bound(&range.start), bound(&range.end))
}

/// Default text of a scalar native value
///
/// Returns `None` for records and arrays, which have no scalar text.
pub fn scalar_text(value: &NativeValue) -> Option<String> {
    let text = match value {
        NativeValue::Null => NULL_TEXT.to_string(),
        NativeValue::Int(v) => v.to_string(),
        NativeValue::Float(v) => float_text(*v),
        NativeValue::Numeric(v) => numeric_text(v)?,
        NativeValue::String(v) => v.clone(),
        NativeValue::Bool(v) => v.to_string(),
        NativeValue::Date(v) => date_text(v),
        NativeValue::DateTime(v) => datetime_text(v),
        NativeValue::Time(v) => time_text(v),
        NativeValue::Timestamp(v) => timestamp_text(v),
        NativeValue::Interval(v) => v.to_string(),
        NativeValue::Range(v) => range_text(v),
        NativeValue::Record(_) | NativeValue::Array(_) => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_float_text() {
        assert_eq!(float_text(1.99999), "1.99999");
        assert_eq!(float_text(2.0), "2");
        assert_eq!(float_text(11.111111111), "11.111111111");
        assert_eq!(float_text(2.34e12), "2.34e+12");
        assert_eq!(float_text(3.34e12), "3.34e+12");
        assert_eq!(float_text(100000.0), "100000");
        assert_eq!(float_text(1e6), "1e+06");
        assert_eq!(float_text(123456789.0), "1.23456789e+08");
        assert_eq!(float_text(0.0001), "0.0001");
        assert_eq!(float_text(0.00001), "1e-05");
        assert_eq!(float_text(-2.5), "-2.5");
        assert_eq!(float_text(f64::INFINITY), "+Inf");
    }

    #[test]
    fn test_timestamp_text() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 45).unwrap();
        assert_eq!(timestamp_text(&ts), "2023-12-25 10:30:45 +0000 UTC");

        let ts = ts + chrono::Duration::milliseconds(500);
        assert_eq!(timestamp_text(&ts), "2023-12-25 10:30:45.5 +0000 UTC");
    }

    #[test]
    fn test_range_text() {
        let range = RangeValue::new(Some(NativeValue::Int(1)), Some(NativeValue::Int(5)));
        assert_eq!(range_text(&range), "[1,5)");

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = RangeValue::new(Some(NativeValue::Date(date)), None);
        assert_eq!(range_text(&range), "[2024-01-01,UNBOUNDED)");
    }
}
