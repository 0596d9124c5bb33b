//! Result schema types
//!
//! A query result is described by an ordered list of [`FieldSchema`]s derived
//! once from the warehouse's metadata response. Record fields carry their
//! children, so a schema is a tree of arbitrary depth.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Warehouse column type
///
/// Aliases collapse onto one tag (`INT64`, `SMALLINT`, `TINYINT`... are all
/// [`TypeTag::Integer`]). Anything unrecognised is kept as
/// [`TypeTag::Unsupported`] so that conversion can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Float,
    Numeric,
    BigNumeric,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp,
    Geography,
    Json,
    Interval,
    Range,
    Record,
    Unsupported(String),
}

impl TypeTag {
    /// Parse a warehouse type name (case-insensitive)
    pub fn parse(type_name: &str) -> Self {
        let upper = type_name.trim().to_uppercase();
        match upper.as_str() {
            "INTEGER" | "INT64" | "INT" | "SMALLINT" | "TINYINT" | "BYTEINT" | "BIGINT" => Self::Integer,
            "FLOAT" | "FLOAT64" => Self::Float,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            "BIGNUMERIC" | "BIGDECIMAL" => Self::BigNumeric,
            "STRING" => Self::String,
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "DATETIME" => Self::DateTime,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "GEOGRAPHY" => Self::Geography,
            "JSON" => Self::Json,
            "INTERVAL" => Self::Interval,
            "RANGE" => Self::Range,
            "RECORD" | "STRUCT" => Self::Record,
            _ => Self::Unsupported(upper),
        }
    }

    /// Canonical warehouse name for this tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Numeric => "NUMERIC",
            Self::BigNumeric => "BIGNUMERIC",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Geography => "GEOGRAPHY",
            Self::Json => "JSON",
            Self::Interval => "INTERVAL",
            Self::Range => "RANGE",
            Self::Record => "RECORD",
            Self::Unsupported(name) => name,
        }
    }

    /// Whether values of this type can appear in ORDER BY
    ///
    /// Geography and record values are not orderable.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Geography | Self::Record)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape of one result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireField", into = "WireField")]
pub struct FieldSchema {
    /// Column name
    pub name: String,

    /// Type tag
    pub type_tag: TypeTag,

    /// Whether the column holds an array of `type_tag`
    pub repeated: bool,

    /// Child fields, only populated for records
    pub fields: Vec<FieldSchema>,

    /// Element type of a range column
    pub range_element: Option<TypeTag>,
}

impl FieldSchema {
    /// Create a non-repeated scalar field
    pub fn new(name: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            type_tag,
            repeated: false,
            fields: Vec::new(),
            range_element: None,
        }
    }

    /// Create a record field with the given children
    pub fn record(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            type_tag: TypeTag::Record,
            repeated: false,
            fields,
            range_element: None,
        }
    }

    /// Mark the field as repeated
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Set the element type of a range field
    pub fn with_range_element(mut self, element: TypeTag) -> Self {
        self.range_element = Some(element);
        self
    }

    /// Whether this is a record field
    pub fn is_record(&self) -> bool {
        self.type_tag == TypeTag::Record
    }

    /// Child field names in schema order
    pub fn child_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Type as shown to relational consumers, e.g. `ARRAY<INTEGER>`
    pub fn database_type_name(&self) -> String {
        if self.repeated {
            format!("ARRAY<{}>", self.type_tag)
        } else {
            self.type_tag.to_string()
        }
    }
}

/// Flatten a schema into column names, descending into records
///
/// A record contributes its own name followed by `parent.child` for every
/// nested column. With `orderable_only`, geography fields and everything
/// beneath a record are left out; the record's own name stays.
pub fn column_names(schema: &[FieldSchema], orderable_only: bool) -> Vec<String> {
    let mut result = Vec::new();

    for field in schema {
        let keep = !orderable_only || field.type_tag.is_orderable();

        if field.is_record() {
            result.push(field.name.clone());
            if keep {
                for nested in column_names(&field.fields, orderable_only) {
                    result.push(format!("{}.{}", field.name, nested));
                }
            }
        } else if keep {
            result.push(field.name.clone());
        }
    }

    result
}

/// Field schema as it appears in the warehouse REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireField {
    name: String,

    #[serde(rename = "type")]
    type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<WireField>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    range_element_type: Option<WireRangeElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRangeElement {
    #[serde(rename = "type")]
    type_name: String,
}

impl From<WireField> for FieldSchema {
    fn from(wire: WireField) -> Self {
        let type_tag = TypeTag::parse(&wire.type_name);
        let repeated = wire
            .mode
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("REPEATED"))
            .unwrap_or(false);

        // Children are only meaningful on records
        let fields = if type_tag == TypeTag::Record {
            wire.fields
                .unwrap_or_default()
                .into_iter()
                .map(FieldSchema::from)
                .collect()
        } else {
            Vec::new()
        };

        Self {
            name: wire.name,
            type_tag,
            repeated,
            fields,
            range_element: wire.range_element_type.map(|r| TypeTag::parse(&r.type_name)),
        }
    }
}

impl From<FieldSchema> for WireField {
    fn from(field: FieldSchema) -> Self {
        let fields = if field.fields.is_empty() {
            None
        } else {
            Some(field.fields.into_iter().map(WireField::from).collect())
        };

        Self {
            name: field.name,
            type_name: field.type_tag.as_str().to_string(),
            mode: Some(if field.repeated { "REPEATED" } else { "NULLABLE" }.to_string()),
            fields,
            range_element_type: field.range_element.map(|t| WireRangeElement {
                type_name: t.as_str().to_string(),
            }),
        }
    }
}

/// Parse the `fields` array of a REST `TableSchema` document
pub fn parse_table_schema(schema: &serde_json::Value) -> Result<Vec<FieldSchema>, serde_json::Error> {
    match schema.get("fields") {
        Some(fields) => serde_json::from_value(fields.clone()),
        None => Ok(Vec::new()),
    }
}
