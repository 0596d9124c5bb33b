//! Mock warehouse for testing
//!
//! Serves scripted result pages and metadata from memory. Useful for:
//! - Unit testing the connection, iterator and cache logic
//! - Exercising the HTTP routes without credentials
//! - Simulating submission, paging and metadata failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bqsql_driver::{MockWarehouse, MockFactory, Registry};
//!
//! let warehouse = MockWarehouse::new();
//! warehouse.add_result("SELECT 1", schema, vec![vec![vec![NativeValue::Int(1)]]]).await;
//!
//! let factory = MockFactory::new(warehouse.clone());
//! let registry = Registry::new(Arc::new(factory.clone()));
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Fail the second page of a result
//! warehouse.add_page_error("SELECT 1", 1, DriverError::iteration(Some(500), "backend error")).await;
//!
//! // Slow every call down
//! let warehouse = MockWarehouse::new().with_latency(100);
//! ```

use crate::auth::{TokenMiddleware, TokenSource};
use crate::warehouse::{JobRef, PageRow, QueryJob, ResultPage, TableMetadata, Warehouse, WarehouseFactory};
use bqsql_core::{DatasourceSettings, DriverError, FieldSchema, NativeValue, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A scripted query result
#[derive(Debug, Clone)]
struct MockResult {
    schema: Vec<FieldSchema>,
    pages: Vec<Vec<PageRow>>,
    page_error: Option<(usize, DriverError)>,
}

/// Mock warehouse
///
/// Clones share state, so a test can keep a handle to the warehouse a
/// factory hands out and inspect what was submitted to it.
#[derive(Clone, Default)]
pub struct MockWarehouse {
    /// Scripted results by query text
    results: Arc<RwLock<HashMap<String, MockResult>>>,

    /// Errors returned at submission, by query text
    submit_errors: Arc<RwLock<HashMap<String, DriverError>>>,

    /// Accepted jobs: job id -> query text
    jobs: Arc<RwLock<HashMap<String, String>>>,

    /// Every submitted job, in order
    submitted: Arc<RwLock<Vec<QueryJob>>>,

    /// Dataset ids by project
    datasets: Arc<RwLock<HashMap<String, Vec<String>>>>,

    /// Table schemas by (project, dataset), in insertion order
    tables: Arc<RwLock<HashMap<(String, String), Vec<(String, Vec<FieldSchema>)>>>>,

    /// Error returned by every metadata call
    metadata_error: Arc<RwLock<Option<DriverError>>>,

    /// Number of `close` calls
    closes: Arc<AtomicUsize>,

    /// Simulated latency of every call (milliseconds)
    latency_ms: u64,
}

impl MockWarehouse {
    /// Create an empty mock warehouse
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Script the result of a query; each inner vector is one page
    pub async fn add_result(
        &self,
        query: &str,
        schema: Vec<FieldSchema>,
        pages: Vec<Vec<Vec<NativeValue>>>,
    ) {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(PageRow::Native).collect())
            .collect();
        self.script(query, schema, pages).await;
    }

    /// Script a result whose rows arrive in REST wire form (`{"f": [...]}`)
    pub async fn add_wire_result(&self, query: &str, schema: Vec<FieldSchema>, pages: Vec<Vec<serde_json::Value>>) {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(PageRow::Wire).collect())
            .collect();
        self.script(query, schema, pages).await;
    }

    async fn script(&self, query: &str, schema: Vec<FieldSchema>, pages: Vec<Vec<PageRow>>) {
        self.results.write().await.insert(
            query.to_string(),
            MockResult {
                schema,
                pages,
                page_error: None,
            },
        );
    }

    /// Fail fetching page `page_index` (0 is the first page) of a scripted query
    pub async fn add_page_error(&self, query: &str, page_index: usize, error: DriverError) {
        if let Some(result) = self.results.write().await.get_mut(query) {
            result.page_error = Some((page_index, error));
        }
    }

    /// Reject a query at submission
    pub async fn add_submit_error(&self, query: &str, error: DriverError) {
        self.submit_errors.write().await.insert(query.to_string(), error);
    }

    /// Add a dataset to a project
    pub async fn add_dataset(&self, project: &str, dataset: &str) {
        self.datasets
            .write()
            .await
            .entry(project.to_string())
            .or_default()
            .push(dataset.to_string());
    }

    /// Add a table, creating its dataset if needed
    pub async fn add_table(&self, project: &str, dataset: &str, table: &str, schema: Vec<FieldSchema>) {
        {
            let mut datasets = self.datasets.write().await;
            let entry = datasets.entry(project.to_string()).or_default();
            if !entry.iter().any(|d| d == dataset) {
                entry.push(dataset.to_string());
            }
        }

        self.tables
            .write()
            .await
            .entry((project.to_string(), dataset.to_string()))
            .or_default()
            .push((table.to_string(), schema));
    }

    /// Fail every metadata call with `error`
    pub async fn fail_metadata(&self, error: DriverError) {
        *self.metadata_error.write().await = Some(error);
    }

    /// Jobs submitted so far
    pub async fn submitted(&self) -> Vec<QueryJob> {
        self.submitted.read().await.clone()
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }

    async fn check_metadata(&self) -> Result<()> {
        match self.metadata_error.read().await.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn page(job: JobRef, result: &MockResult, index: usize) -> Result<ResultPage> {
        if let Some((failing, err)) = &result.page_error {
            if *failing == index {
                return Err(err.clone());
            }
        }

        let rows = result.pages.get(index).cloned().unwrap_or_default();
        let page_token = if index + 1 < result.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };

        Ok(ResultPage {
            job,
            schema: if index == 0 { result.schema.clone() } else { Vec::new() },
            rows,
            page_token,
        })
    }
}

#[async_trait::async_trait]
impl Warehouse for MockWarehouse {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn submit(&self, job: &QueryJob) -> Result<ResultPage> {
        self.simulate_latency().await;
        self.submitted.write().await.push(job.clone());

        if let Some(err) = self.submit_errors.read().await.get(&job.query) {
            return Err(err.clone());
        }

        let result = self
            .results
            .read()
            .await
            .get(&job.query)
            .cloned()
            .ok_or_else(|| DriverError::submission(Some(400), format!("Unrecognized query: {}", job.query)))?;

        let job_id = {
            let mut jobs = self.jobs.write().await;
            let job_id = format!("job_{}", jobs.len() + 1);
            jobs.insert(job_id.clone(), job.query.clone());
            job_id
        };

        let job_ref = JobRef {
            project: job.project.clone(),
            job_id,
            location: job.location.clone(),
        };

        Self::page(job_ref, &result, 0)
    }

    async fn fetch_page(&self, job: &JobRef, page_token: &str, _schema: &[FieldSchema]) -> Result<ResultPage> {
        self.simulate_latency().await;

        let query = self
            .jobs
            .read()
            .await
            .get(&job.job_id)
            .cloned()
            .ok_or_else(|| DriverError::iteration(Some(404), format!("Not found: Job {}", job.job_id)))?;

        let index: usize = page_token
            .parse()
            .map_err(|_| DriverError::iteration(Some(400), format!("Invalid page token: {}", page_token)))?;

        let results = self.results.read().await;
        let result = results
            .get(&query)
            .ok_or_else(|| DriverError::iteration(Some(404), format!("Not found: Job {}", job.job_id)))?;

        Self::page(job.clone(), result, index)
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<String>> {
        self.simulate_latency().await;
        self.check_metadata().await?;

        Ok(self.datasets.read().await.get(project).cloned().unwrap_or_default())
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>> {
        self.simulate_latency().await;
        self.check_metadata().await?;

        let tables = self.tables.read().await;
        Ok(tables
            .get(&(project.to_string(), dataset.to_string()))
            .map(|t| t.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn table_schema(&self, project: &str, dataset: &str, table: &str) -> Result<TableMetadata> {
        self.simulate_latency().await;
        self.check_metadata().await?;

        let tables = self.tables.read().await;
        let schema = tables
            .get(&(project.to_string(), dataset.to_string()))
            .and_then(|t| t.iter().find(|(name, _)| name == table))
            .map(|(_, schema)| schema.clone())
            .ok_or_else(|| {
                DriverError::warehouse(
                    Some(404),
                    format!("Not found: Table {}:{}.{}", project, dataset, table),
                )
            })?;

        Ok(TableMetadata {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            schema,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out a shared [`MockWarehouse`]
///
/// Authentication settings are validated exactly like the real factory, and
/// every successful construction is counted.
#[derive(Clone)]
pub struct MockFactory {
    warehouse: MockWarehouse,
    created: Arc<AtomicUsize>,
    failure: Arc<RwLock<Option<DriverError>>>,
    latency_ms: u64,
    /// Project reported for instance credentials
    discoverable: Option<String>,
    discoveries: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn new(warehouse: MockWarehouse) -> Self {
        Self {
            warehouse,
            created: Arc::new(AtomicUsize::new(0)),
            failure: Arc::new(RwLock::new(None)),
            latency_ms: 0,
            discoverable: None,
            discoveries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report `project` as the instance's project for gce tenants
    pub fn with_default_project(mut self, project: &str) -> Self {
        self.discoverable = Some(project.to_string());
        self
    }

    /// Number of default project lookups
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    /// Delay every construction, widening the window concurrent callers race in
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Make every subsequent construction fail
    pub async fn fail_with(&self, error: DriverError) {
        *self.failure.write().await = Some(error);
    }

    /// Number of successful constructions
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn warehouse(&self) -> &MockWarehouse {
        &self.warehouse
    }
}

#[async_trait::async_trait]
impl WarehouseFactory for MockFactory {
    async fn create(&self, settings: &DatasourceSettings, _project: &str) -> Result<Arc<dyn Warehouse>> {
        TokenMiddleware::from_settings(settings)?;

        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }

        if let Some(err) = self.failure.read().await.as_ref() {
            return Err(err.clone());
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.warehouse.clone()))
    }

    async fn default_project(&self, settings: &DatasourceSettings) -> Result<String> {
        if TokenMiddleware::from_settings(settings)?.source != TokenSource::Gce {
            return Err(DriverError::Config(format!(
                "datasource {} has no default project and none can be discovered",
                settings.id
            )));
        }

        self.discoveries.fetch_add(1, Ordering::SeqCst);
        self.discoverable.clone().ok_or_else(|| {
            DriverError::Authentication(
                "failed to retrieve default project from GCE metadata server".to_string(),
            )
        })
    }
}
