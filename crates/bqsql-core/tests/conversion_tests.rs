//! Conversion tests across every warehouse type
//!
//! Each case converts a native value against a field schema and checks both
//! the generic variant and its rendered value. Record results are compared
//! through their JSON serialization.

mod fixtures;

use bqsql_core::{convert, DriverError, FieldSchema, GenericValue, IntervalValue, NativeValue, RangeValue, TypeTag};
use chrono::{TimeZone, Utc};
use fixtures::{date, time};
use pretty_assertions::assert_eq;

fn field(type_name: &str) -> FieldSchema {
    FieldSchema::new("col", TypeTag::parse(type_name))
}

fn repeated(type_name: &str) -> FieldSchema {
    field(type_name).repeated()
}

fn array(values: Vec<NativeValue>) -> NativeValue {
    NativeValue::Array(values)
}

fn text(value: GenericValue) -> String {
    match value {
        GenericValue::String(s) => s,
        other => panic!("Expected string, got {:?}", other),
    }
}

// =============================================================================
// Integers
// =============================================================================

#[test]
fn test_integer_aliases_pass_through() {
    for alias in ["TINYINT", "SMALLINT", "INT", "INTEGER", "INT64"] {
        let value = convert(&NativeValue::Int(1), &field(alias)).unwrap();
        assert_eq!(value, GenericValue::Int(1), "{}", alias);
    }
}

#[test]
fn test_repeated_integers_join() {
    for alias in ["TINYINT", "SMALLINT", "INT", "INTEGER", "INT64"] {
        let value = convert(&array(vec![NativeValue::Int(1), NativeValue::Int(2)]), &repeated(alias)).unwrap();
        assert_eq!(text(value), "1,2", "{}", alias);
    }
}

// =============================================================================
// Floats and decimals
// =============================================================================

#[test]
fn test_float_pass_through() {
    for alias in ["FLOAT", "FLOAT64"] {
        let value = convert(&NativeValue::Float(1.99999), &field(alias)).unwrap();
        assert_eq!(value, GenericValue::Float(1.99999));

        let value = convert(
            &array(vec![NativeValue::Float(1.99999), NativeValue::Float(2.99999)]),
            &repeated(alias),
        )
        .unwrap();
        assert_eq!(text(value), "1.99999,2.99999");
    }
}

#[test]
fn test_numeric_becomes_float() {
    let value = convert(&NativeValue::Numeric("2".into()), &field("NUMERIC")).unwrap();
    assert_eq!(value, GenericValue::Float(2.0));

    let value = convert(&NativeValue::Numeric("11.111111111".into()), &field("NUMERIC")).unwrap();
    assert_eq!(value, GenericValue::Float(11.111111111));

    let value = convert(&NativeValue::Numeric("2340000000000".into()), &field("BIGNUMERIC")).unwrap();
    assert_eq!(value, GenericValue::Float(2.34e12));
}

#[test]
fn test_repeated_numeric_uses_float_text() {
    let value = convert(
        &array(vec![NativeValue::Numeric("2".into()), NativeValue::Numeric("3".into())]),
        &repeated("NUMERIC"),
    )
    .unwrap();
    assert_eq!(text(value), "2,3");

    let value = convert(
        &array(vec![
            NativeValue::Numeric("11.111111111".into()),
            NativeValue::Numeric("11.111111111".into()),
        ]),
        &repeated("NUMERIC"),
    )
    .unwrap();
    assert_eq!(text(value), "11.111111111,11.111111111");

    let value = convert(
        &array(vec![
            NativeValue::Numeric("2340000000000".into()),
            NativeValue::Numeric("3340000000000".into()),
        ]),
        &repeated("BIGNUMERIC"),
    )
    .unwrap();
    assert_eq!(text(value), "2.34e+12,3.34e+12");
}

// =============================================================================
// Dates and times
// =============================================================================

#[test]
fn test_date() {
    let value = convert(&NativeValue::Date(date(2019, 1, 1)), &field("DATE")).unwrap();
    assert_eq!(text(value), "2019-01-01");

    let value = convert(
        &array(vec![NativeValue::Date(date(2019, 1, 1)), NativeValue::Date(date(2019, 2, 1))]),
        &repeated("DATE"),
    )
    .unwrap();
    assert_eq!(text(value), "2019-01-01,2019-02-01");
}

#[test]
fn test_datetime() {
    let dt = |m| NativeValue::DateTime(date(2019, m, 1).and_time(time(1, 1, 1)));

    assert_eq!(text(convert(&dt(1), &field("DATETIME")).unwrap()), "2019-01-01 01:01:01");
    assert_eq!(
        text(convert(&array(vec![dt(1), dt(2)]), &repeated("DATETIME")).unwrap()),
        "2019-01-01 01:01:01,2019-02-01 01:01:01"
    );
}

#[test]
fn test_time() {
    assert_eq!(text(convert(&NativeValue::Time(time(1, 1, 1)), &field("TIME")).unwrap()), "01:01:01");
    assert_eq!(
        text(
            convert(
                &array(vec![NativeValue::Time(time(1, 1, 1)), NativeValue::Time(time(2, 1, 1))]),
                &repeated("TIME"),
            )
            .unwrap()
        ),
        "01:01:01,02:01:01"
    );
}

#[test]
fn test_timestamp_keeps_nanoseconds() {
    let ts = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 45).unwrap()
        + chrono::Duration::nanoseconds(123_456_789);

    let value = convert(&NativeValue::Timestamp(ts), &field("TIMESTAMP")).unwrap();
    assert_eq!(value, GenericValue::Timestamp(ts));
    assert_eq!(value.as_timestamp().unwrap().timestamp_subsec_nanos(), 123_456_789);
}

#[test]
fn test_repeated_timestamp_text() {
    let a = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 45).unwrap();
    let b = Utc.with_ymd_and_hms(2023, 12, 26, 11, 31, 46).unwrap();

    let value = convert(
        &array(vec![NativeValue::Timestamp(a), NativeValue::Timestamp(b)]),
        &repeated("TIMESTAMP"),
    )
    .unwrap();
    assert_eq!(text(value), "2023-12-25 10:30:45 +0000 UTC,2023-12-26 11:31:46 +0000 UTC");
}

// =============================================================================
// Text-like types
// =============================================================================

#[test]
fn test_geography() {
    let value = convert(&NativeValue::String("POINT(1.0 1.0)".into()), &field("GEOGRAPHY")).unwrap();
    assert_eq!(text(value), "POINT(1.0 1.0)");

    let value = convert(
        &array(vec![
            NativeValue::String("POINT(1.0 1.0)".into()),
            NativeValue::String("POINT(2.0 2.0)".into()),
        ]),
        &repeated("GEOGRAPHY"),
    )
    .unwrap();
    assert_eq!(text(value), "POINT(1.0 1.0),POINT(2.0 2.0)");
}

#[test]
fn test_json() {
    let john = r#"{"name": "John", "age": 30}"#;
    let jane = r#"{"name": "Jane", "age": 25}"#;

    assert_eq!(text(convert(&NativeValue::String(john.into()), &field("JSON")).unwrap()), john);
    assert_eq!(
        text(
            convert(
                &array(vec![NativeValue::String(john.into()), NativeValue::String(jane.into())]),
                &repeated("JSON"),
            )
            .unwrap()
        ),
        format!("{},{}", john, jane)
    );
}

#[test]
fn test_boolean() {
    assert_eq!(convert(&NativeValue::Bool(true), &field("BOOL")).unwrap(), GenericValue::Bool(true));
    assert_eq!(
        text(convert(&array(vec![NativeValue::Bool(true), NativeValue::Bool(false)]), &repeated("BOOLEAN")).unwrap()),
        "true,false"
    );
}

// =============================================================================
// Interval and range
// =============================================================================

#[test]
fn test_interval() {
    let micro = IntervalValue { sub_second_nanos: 1000, ..Default::default() };
    let year = IntervalValue { years: 1, sub_second_nanos: 2000, ..Default::default() };

    assert_eq!(text(convert(&NativeValue::Interval(micro), &field("INTERVAL")).unwrap()), "0-0 0 0:0:0.000001");
    assert_eq!(
        text(
            convert(
                &array(vec![NativeValue::Interval(micro), NativeValue::Interval(year)]),
                &repeated("INTERVAL"),
            )
            .unwrap()
        ),
        "0-0 0 0:0:0.000001,1-0 0 0:0:0.000002"
    );
}

#[test]
fn test_range() {
    let range = |a, b| NativeValue::Range(RangeValue::new(Some(NativeValue::Int(a)), Some(NativeValue::Int(b))));

    assert_eq!(text(convert(&range(1, 5), &field("RANGE")).unwrap()), "[1,5)");
    assert_eq!(
        text(convert(&array(vec![range(1, 5), range(10, 20)]), &repeated("RANGE")).unwrap()),
        "[1,5),[10,20)"
    );
}

// =============================================================================
// Records
// =============================================================================

#[test]
fn test_nested_record_serialization() {
    let value = convert(&fixtures::nested_record_value(), &fixtures::nested_record_schema()).unwrap();
    assert!(value.as_record().is_some());

    assert_eq!(
        value.to_json(),
        "{\"col1\":1,\"col2\":1.99999,\"col3\":\"text value\",\"col4\":\"01:01:01\",\"col5\":\"2019-01-01 01:01:01\",\
         \"col6\":{\"nested1\":1,\"nested2\":1.99999,\"nested3\":\"text value\",\"nested4\":\"01:01:01\",\"nested5\":\"2019-01-01 01:01:01\"}}"
    );
}

#[test]
fn test_record_keys_follow_schema_order() {
    let schema = fixtures::nested_record_schema();
    let value = convert(&fixtures::nested_record_value(), &schema).unwrap();

    let keys: Vec<&str> = value.as_record().unwrap().keys().collect();
    assert_eq!(keys, schema.child_names());
}

#[test]
fn test_repeated_record_serialization() {
    let first = NativeValue::Record(fixtures::scalar_values(1, 1.99999, "text value", time(1, 1, 1), date(2019, 1, 1)));
    let value = convert(
        &array(vec![first, fixtures::second_record_value()]),
        &fixtures::repeated_record_schema(),
    )
    .unwrap();

    assert_eq!(value.as_sequence().unwrap().len(), 2);
    assert_eq!(
        value.to_json(),
        "[{\"col1\":1,\"col2\":1.99999,\"col3\":\"text value\",\"col4\":\"01:01:01\",\"col5\":\"2019-01-01 01:01:01\"},\
         {\"col1\":2,\"col2\":2.99999,\"col3\":\"text value 2\",\"col4\":\"02:02:02\",\"col5\":\"2019-02-02 01:01:01\"}]"
    );
}

#[test]
fn test_repeated_record_keeps_null_positions() {
    let value = convert(
        &array(vec![NativeValue::Null, fixtures::second_record_value()]),
        &fixtures::repeated_record_schema(),
    )
    .unwrap();

    let items = value.as_sequence().unwrap();
    assert!(items[0].is_null());
    assert!(items[1].as_record().is_some());
    assert_eq!(
        value.to_json(),
        "[null,{\"col1\":2,\"col2\":2.99999,\"col3\":\"text value 2\",\"col4\":\"02:02:02\",\"col5\":\"2019-02-02 01:01:01\"}]"
    );
}

#[test]
fn test_deeply_nested_records() {
    let mut schema = FieldSchema::new("leaf", TypeTag::Integer);
    let mut value = NativeValue::Int(7);
    for depth in 0..32 {
        schema = FieldSchema::record(format!("level{}", depth), vec![schema]);
        value = NativeValue::Record(vec![value]);
    }

    let mut converted = convert(&value, &schema).unwrap();
    for depth in (0..32).rev() {
        let record = converted.as_record().unwrap().clone();
        let key = if depth == 0 { "leaf".to_string() } else { format!("level{}", depth - 1) };
        converted = record.get(&key).unwrap().clone();
    }
    assert_eq!(converted, GenericValue::Int(7));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_unknown_type_tag_fails() {
    let err = convert(&NativeValue::String("x".into()), &field("BYTES")).unwrap_err();
    assert!(matches!(err, DriverError::UnsupportedType(_)));

    let err = convert(&array(vec![]), &repeated("SOMETHING_NEW")).unwrap_err();
    assert!(matches!(err, DriverError::UnsupportedType(_)));
}

#[test]
fn test_repeated_record_element_arity_mismatch() {
    let err = convert(
        &array(vec![NativeValue::Record(vec![NativeValue::Int(1)])]),
        &fixtures::repeated_record_schema(),
    )
    .unwrap_err();
    assert!(matches!(err, DriverError::SchemaDrift(_)));
}
