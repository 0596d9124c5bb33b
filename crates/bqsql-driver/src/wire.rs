//! REST response documents -> driver pages
//!
//! The warehouse client hands back typed response models; they are
//! re-serialized to JSON and read here so that row decoding goes through a
//! single path regardless of which client produced them.

use crate::warehouse::{JobRef, PageRow, ResultPage};
use bqsql_core::schema::parse_table_schema;
use bqsql_core::{DriverError, FieldSchema, Result};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;

/// Query / getQueryResults response, as far as the driver cares
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    job_reference: Option<WireJobReference>,

    #[serde(default)]
    schema: Option<Value>,

    #[serde(default)]
    rows: Option<Vec<Value>>,

    #[serde(default)]
    page_token: Option<String>,

    #[serde(default)]
    job_complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJobReference {
    #[serde(default)]
    project_id: Option<String>,

    #[serde(default)]
    job_id: Option<String>,

    #[serde(default)]
    location: Option<String>,
}

/// A decoded response plus the completion flag used for polling
#[derive(Debug, Clone, PartialEq)]
pub struct WirePage {
    pub page: ResultPage,
    pub complete: bool,
}

/// Decode a query response document
///
/// `fallback_schema` is used when the document carries no schema, which is
/// the case for some continuation pages. Rows are kept in wire form; the
/// iterator decodes each one when it reaches it.
pub fn parse_page(doc: &Value, fallback: &JobRef, fallback_schema: &[FieldSchema]) -> Result<WirePage> {
    let response: WireResponse = serde_json::from_value(doc.clone())
        .map_err(|e| DriverError::Conversion(format!("malformed query response: {}", e)))?;

    let job = match response.job_reference {
        Some(r) => JobRef {
            project: r.project_id.unwrap_or_else(|| fallback.project.clone()),
            job_id: r.job_id.unwrap_or_else(|| fallback.job_id.clone()),
            location: r.location.or_else(|| fallback.location.clone()),
        },
        None => fallback.clone(),
    };

    let schema = match response.schema.as_ref() {
        Some(s) if !s.is_null() => parse_table_schema(s)
            .map_err(|e| DriverError::Conversion(format!("malformed result schema: {}", e)))?,
        _ => fallback_schema.to_vec(),
    };

    let rows = response.rows.unwrap_or_default().into_iter().map(PageRow::Wire).collect();

    Ok(WirePage {
        page: ResultPage {
            job,
            schema,
            rows,
            page_token: response.page_token.filter(|t| !t.is_empty()),
        },
        complete: response.job_complete.unwrap_or(true),
    })
}

/// Collect `<list_key>[*].<ref_key>.<id_key>` from a list response
pub fn reference_ids(doc: &Value, list_key: &str, ref_key: &str, id_key: &str) -> Vec<String> {
    doc.get(list_key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ref_key)?.get(id_key)?.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Collect ids across every page of a list call
///
/// `fetch` is called with the page token of the previous response (`None`
/// for the first page) until a response carries no `nextPageToken`.
pub async fn collect_reference_ids<F, Fut>(
    list_key: &str,
    ref_key: &str,
    id_key: &str,
    mut fetch: F,
) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let doc = fetch(page_token.take()).await?;
        ids.extend(reference_ids(&doc, list_key, ref_key, id_key));

        match doc.get("nextPageToken").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
            _ => return Ok(ids),
        }
    }
}
