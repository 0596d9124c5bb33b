//! Warehouse trait: the boundary between the driver and the query service

use bqsql_core::decode::decode_row;
use bqsql_core::{DatasourceSettings, DriverError, FieldSchema, NativeValue, Result};
use serde::Serialize;
use std::sync::Arc;

/// A query submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    /// Query text, passed through verbatim
    pub query: String,

    /// Project the job runs (and is billed) in
    pub project: String,

    /// Dataset unqualified table names resolve against
    pub default_dataset: Option<String>,

    /// Processing location
    pub location: Option<String>,
}

impl QueryJob {
    pub fn new(query: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            project: project.into(),
            default_dataset: None,
            location: None,
        }
    }

    pub fn with_default_dataset(mut self, dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        self.default_dataset = if dataset.is_empty() { None } else { Some(dataset) };
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = if location.is_empty() { None } else { Some(location) };
        self
    }
}

/// Handle of an accepted query job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub project: String,
    pub job_id: String,
    pub location: Option<String>,
}

/// One result row as delivered with its page
///
/// Rows are decoded only when the iterator reaches them, so a malformed row
/// fails that row's `next()` rather than the whole page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageRow {
    /// Already in native representation
    Native(Vec<NativeValue>),

    /// REST `{"f": [...]}` row, decoded against the result schema on demand
    Wire(serde_json::Value),
}

impl PageRow {
    /// Native cell values of the row
    ///
    /// Wire rows whose width differs from `schema` are a schema-drift error.
    pub fn into_native(self, schema: &[FieldSchema]) -> Result<Vec<NativeValue>> {
        match self {
            PageRow::Native(values) => Ok(values),
            PageRow::Wire(row) => decode_row(&row, schema),
        }
    }
}

impl From<Vec<NativeValue>> for PageRow {
    fn from(values: Vec<NativeValue>) -> Self {
        PageRow::Native(values)
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    /// Job the page belongs to
    pub job: JobRef,

    /// Result schema; may be empty on continuation pages
    pub schema: Vec<FieldSchema>,

    /// Rows, not yet decoded
    pub rows: Vec<PageRow>,

    /// Token of the next page, `None` on the last page
    pub page_token: Option<String>,
}

/// Table metadata returned to schema lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetadata {
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub schema: Vec<FieldSchema>,
}

/// Trait for warehouse clients the driver issues queries through
///
/// Every method is a network call. Callers race them against a
/// cancellation token; implementations must abort cleanly when dropped.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Get the warehouse name (e.g., "BigQuery")
    fn name(&self) -> &'static str;

    /// Submit a query and wait until the job is accepted and its first page
    /// is available
    async fn submit(&self, job: &QueryJob) -> Result<ResultPage>;

    /// Fetch the page identified by `page_token`
    ///
    /// `schema` is the result schema from the first page, for responses that
    /// omit it.
    async fn fetch_page(&self, job: &JobRef, page_token: &str, schema: &[FieldSchema]) -> Result<ResultPage>;

    /// List dataset ids of a project
    async fn list_datasets(&self, project: &str) -> Result<Vec<String>>;

    /// List table ids of a dataset
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>>;

    /// Fetch a table's schema
    async fn table_schema(&self, project: &str, dataset: &str, table: &str) -> Result<TableMetadata>;

    /// Release the client's session
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds authenticated warehouse clients for a tenant and project
///
/// Each call performs exactly one authentication / client construction.
#[async_trait::async_trait]
pub trait WarehouseFactory: Send + Sync {
    async fn create(&self, settings: &DatasourceSettings, project: &str) -> Result<Arc<dyn Warehouse>>;

    /// Project to use when a tenant configures none
    ///
    /// Only meaningful for instance credentials; other factories have no
    /// ambient project to offer.
    async fn default_project(&self, settings: &DatasourceSettings) -> Result<String> {
        Err(DriverError::Config(format!(
            "datasource {} has no default project and none can be discovered",
            settings.id
        )))
    }
}
