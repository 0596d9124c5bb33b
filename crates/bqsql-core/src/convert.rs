//! Value converter
//!
//! Maps a native cell onto the generic value model, driven entirely by the
//! field's type tag and repetition flag:
//!
//! - non-repeated scalars keep numeric and temporal types where the generic
//!   model has them (integer, float, boolean, timestamp) and become text
//!   otherwise (date, datetime, time, interval, range);
//! - repeated scalars are flattened into one comma-joined string;
//! - records become ordered mappings, and repeated records become sequences
//!   of mappings with null elements kept in place.
//!
//! Decimals are converted to `f64`; the precision loss is accepted.

use crate::error::{DriverError, Result};
use crate::format;
use crate::schema::{FieldSchema, TypeTag};
use crate::value::{GenericValue, NativeValue, Record};

/// Convert one native value against its field schema
pub fn convert(value: &NativeValue, field: &FieldSchema) -> Result<GenericValue> {
    if let TypeTag::Unsupported(name) = &field.type_tag {
        return Err(DriverError::UnsupportedType(format!(
            "column '{}' has type {}",
            field.name, name
        )));
    }

    if value.is_null() {
        return Ok(GenericValue::Null);
    }

    if field.repeated {
        let elements = match value {
            NativeValue::Array(elements) => elements,
            other => return Err(mismatch(field, "array", other)),
        };

        if field.is_record() {
            convert_record_array(elements, field)
        } else {
            join_scalars(elements, field)
        }
    } else {
        convert_single(value, field)
    }
}

/// Convert a whole row positionally against the result schema
pub fn convert_row(values: &[NativeValue], schema: &[FieldSchema]) -> Result<Vec<GenericValue>> {
    if values.len() != schema.len() {
        return Err(DriverError::SchemaDrift(format!(
            "row has {} cells but the schema declares {} columns",
            values.len(),
            schema.len()
        )));
    }

    values
        .iter()
        .zip(schema)
        .map(|(value, field)| convert(value, field))
        .collect()
}

fn convert_single(value: &NativeValue, field: &FieldSchema) -> Result<GenericValue> {
    let converted = match (&field.type_tag, value) {
        (TypeTag::Integer, NativeValue::Int(v)) => GenericValue::Int(*v),

        (TypeTag::Float, NativeValue::Float(v)) => GenericValue::Float(*v),
        (TypeTag::Float, NativeValue::Int(v)) => GenericValue::Float(*v as f64),

        (TypeTag::Numeric | TypeTag::BigNumeric, NativeValue::Numeric(text)) => {
            GenericValue::Float(parse_decimal(text, field)?)
        }
        (TypeTag::Numeric | TypeTag::BigNumeric, NativeValue::Float(v)) => GenericValue::Float(*v),
        (TypeTag::Numeric | TypeTag::BigNumeric, NativeValue::Int(v)) => GenericValue::Float(*v as f64),

        (TypeTag::String | TypeTag::Geography | TypeTag::Json, NativeValue::String(v)) => {
            GenericValue::String(v.clone())
        }

        (TypeTag::Boolean, NativeValue::Bool(v)) => GenericValue::Bool(*v),

        (TypeTag::Date, NativeValue::Date(v)) => GenericValue::String(format::date_text(v)),
        (TypeTag::DateTime, NativeValue::DateTime(v)) => GenericValue::String(format::datetime_text(v)),
        (TypeTag::Time, NativeValue::Time(v)) => GenericValue::String(format::time_text(v)),
        (TypeTag::Timestamp, NativeValue::Timestamp(v)) => GenericValue::Timestamp(*v),
        (TypeTag::Interval, NativeValue::Interval(v)) => GenericValue::String(v.to_string()),
        (TypeTag::Range, NativeValue::Range(v)) => GenericValue::String(format::range_text(v)),

        (TypeTag::Record, NativeValue::Record(children)) => {
            GenericValue::Record(convert_record(children, field)?)
        }

        (_, other) => return Err(mismatch(field, field.type_tag.as_str(), other)),
    };

    Ok(converted)
}

fn convert_record(children: &[NativeValue], field: &FieldSchema) -> Result<Record> {
    if children.len() != field.fields.len() {
        return Err(DriverError::SchemaDrift(format!(
            "record '{}' has {} values but the schema declares {} fields",
            field.name,
            children.len(),
            field.fields.len()
        )));
    }

    let mut record = Record::with_capacity(children.len());
    for (child, child_field) in children.iter().zip(&field.fields) {
        record.push(child_field.name.clone(), convert(child, child_field)?);
    }

    Ok(record)
}

fn convert_record_array(elements: &[NativeValue], field: &FieldSchema) -> Result<GenericValue> {
    let mut items = Vec::with_capacity(elements.len());

    for element in elements {
        let item = match element {
            NativeValue::Null => GenericValue::Null,
            NativeValue::Record(children) => GenericValue::Record(convert_record(children, field)?),
            other => return Err(mismatch(field, "record", other)),
        };
        items.push(item);
    }

    Ok(GenericValue::Sequence(items))
}

/// Flatten a repeated scalar column into comma-joined text
///
/// Element values are assumed not to contain unescaped commas.
fn join_scalars(elements: &[NativeValue], field: &FieldSchema) -> Result<GenericValue> {
    let mut parts = Vec::with_capacity(elements.len());

    for element in elements {
        // Each element must still match the declared element type
        if !element.is_null() {
            convert_single(element, field)?;
        }

        let text = format::scalar_text(element)
            .ok_or_else(|| mismatch(field, field.type_tag.as_str(), element))?;
        parts.push(text);
    }

    Ok(GenericValue::String(parts.join(",")))
}

fn parse_decimal(text: &str, field: &FieldSchema) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        DriverError::Conversion(format!(
            "column '{}' holds invalid decimal '{}'",
            field.name, text
        ))
    })
}

fn mismatch(field: &FieldSchema, expected: &str, actual: &NativeValue) -> DriverError {
    DriverError::Conversion(format!(
        "column '{}' expected {} value, got {}",
        field.name,
        expected,
        actual.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_integer_passthrough() {
        let field = FieldSchema::new("n", TypeTag::Integer);
        assert_eq!(convert(&NativeValue::Int(1), &field).unwrap(), GenericValue::Int(1));
    }

    #[test]
    fn test_null_is_null_for_any_type() {
        for tag in [TypeTag::Integer, TypeTag::Date, TypeTag::Record, TypeTag::Range] {
            let field = FieldSchema::new("c", tag.clone());
            assert_eq!(convert(&NativeValue::Null, &field).unwrap(), GenericValue::Null);
            assert_eq!(convert(&NativeValue::Null, &field.repeated()).unwrap(), GenericValue::Null);
        }
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let field = FieldSchema::new("blob", TypeTag::parse("BYTES"));
        let err = convert(&NativeValue::String("AAE=".into()), &field).unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedType(_)));

        // Never a default value, even for null input
        assert!(convert(&NativeValue::Null, &field).is_err());
    }

    #[test]
    fn test_type_mismatch_is_a_conversion_error() {
        let field = FieldSchema::new("d", TypeTag::Date);
        let err = convert(&NativeValue::Int(5), &field).unwrap_err();
        assert!(matches!(err, DriverError::Conversion(_)));

        let repeated = FieldSchema::new("xs", TypeTag::Integer).repeated();
        let err = convert(&NativeValue::Int(5), &repeated).unwrap_err();
        assert!(matches!(err, DriverError::Conversion(_)));

        let err = convert(
            &NativeValue::Array(vec![NativeValue::Int(1), NativeValue::String("a".into())]),
            &repeated,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Conversion(_)));
    }

    #[test]
    fn test_empty_repeated_scalar_is_empty_string() {
        let field = FieldSchema::new("xs", TypeTag::Integer).repeated();
        assert_eq!(
            convert(&NativeValue::Array(vec![]), &field).unwrap(),
            GenericValue::String(String::new())
        );
    }

    #[test]
    fn test_record_arity_mismatch_is_schema_drift() {
        let field = FieldSchema::record(
            "r",
            vec![FieldSchema::new("a", TypeTag::Integer), FieldSchema::new("b", TypeTag::Integer)],
        );
        let err = convert(&NativeValue::Record(vec![NativeValue::Int(1)]), &field).unwrap_err();
        assert!(matches!(err, DriverError::SchemaDrift(_)));
    }

    #[test]
    fn test_row_width_mismatch_is_schema_drift() {
        let schema = vec![FieldSchema::new("a", TypeTag::Integer)];
        let err = convert_row(&[NativeValue::Int(1), NativeValue::Int(2)], &schema).unwrap_err();
        assert!(matches!(err, DriverError::SchemaDrift(_)));
    }

    #[test]
    fn test_temporal_text() {
        let date = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let time = NaiveTime::from_hms_opt(1, 1, 1).unwrap();

        let value = convert(&NativeValue::DateTime(date.and_time(time)), &FieldSchema::new("dt", TypeTag::DateTime)).unwrap();
        assert_eq!(value.as_str(), Some("2019-01-01 01:01:01"));

        let value = convert(&NativeValue::Time(time), &FieldSchema::new("t", TypeTag::Time)).unwrap();
        assert_eq!(value.as_str(), Some("01:01:01"));
    }
}
