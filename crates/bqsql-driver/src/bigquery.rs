//! BigQuery warehouse client
//!
//! Queries go through `jobs.query` followed by `jobs.getQueryResults` for
//! polling and paging. Metadata comes from `datasets.list`, `tables.list`
//! and `tables.get`. Response models are decoded through [`crate::wire`].
//!
//! ## Authentication
//!
//! Chosen per datasource by [`TokenMiddleware`]:
//! 1. `gce`: Application Default Credentials (metadata server, gcloud, or
//!    `GOOGLE_APPLICATION_CREDENTIALS`)
//! 2. `jwt`: service account email + private key from the datasource settings
//!
//! ## Default project
//!
//! A `gce` tenant without a default project borrows the project of its
//! ambient identity: `GOOGLE_CLOUD_PROJECT`/`GCLOUD_PROJECT`, then the
//! `GOOGLE_APPLICATION_CREDENTIALS` key file, then the metadata server.
//!
//! Requires the `bigquery` feature; without it the factory returns a
//! configuration error.

use crate::auth::TokenMiddleware;
use crate::warehouse::{Warehouse, WarehouseFactory};
use bqsql_core::{DatasourceSettings, DriverError, Result};
use std::sync::Arc;

#[cfg(feature = "bigquery")]
use crate::auth::TokenSource;
#[cfg(feature = "bigquery")]
use crate::warehouse::{JobRef, QueryJob, ResultPage, TableMetadata};
#[cfg(feature = "bigquery")]
use crate::wire::{collect_reference_ids, parse_page, WirePage};
#[cfg(feature = "bigquery")]
use bqsql_core::{schema::parse_table_schema, FieldSchema};
#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{
    error::BQError,
    model::{get_query_results_parameters::GetQueryResultsParameters, query_request::QueryRequest},
    Client as BigQueryClient,
};

/// Rows requested per result page
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// Environment variables naming the ambient project, in lookup order
#[cfg(feature = "bigquery")]
const PROJECT_ENV: &[&str] = &["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

#[cfg(feature = "bigquery")]
const METADATA_PROJECT_URL: &str = "http://metadata.google.internal/computeMetadata/v1/project/project-id";

#[cfg(feature = "bigquery")]
const METADATA_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// BigQuery client for one tenant
///
/// The authenticated client is dropped on [`Warehouse::close`]; every call
/// after that fails with [`DriverError::ConnectionClosed`].
#[cfg(feature = "bigquery")]
pub struct BigQueryWarehouse {
    client: std::sync::RwLock<Option<BigQueryClient>>,
    page_size: u32,
}

#[cfg(feature = "bigquery")]
impl BigQueryWarehouse {
    /// Authenticate and build a client
    pub async fn connect(middleware: &TokenMiddleware) -> Result<Self> {
        let client = match &middleware.source {
            TokenSource::Gce => BigQueryClient::from_application_default_credentials()
                .await
                .map_err(|e| DriverError::Authentication(format!(
                    "Failed to authenticate with ADC: {}. \
                     Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                    e
                )))?,
            TokenSource::Jwt { client_email, private_key, token_uri } => {
                let key: gcp_bigquery_client::yup_oauth2::ServiceAccountKey =
                    serde_json::from_value(serde_json::json!({
                        "type": "service_account",
                        "client_email": client_email,
                        "private_key": private_key,
                        "token_uri": token_uri,
                    }))
                    .map_err(|e| DriverError::Config(format!("invalid service account key: {}", e)))?;

                BigQueryClient::from_service_account_key(key, false)
                    .await
                    .map_err(|e| DriverError::Authentication(format!(
                        "Failed to authenticate with service account {}: {}",
                        client_email, e
                    )))?
            }
        };

        Ok(Self {
            client: std::sync::RwLock::new(Some(client)),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Handle of the authenticated client, unless the warehouse was closed
    fn client(&self) -> Result<BigQueryClient> {
        let guard = match self.client.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().ok_or(DriverError::ConnectionClosed)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn query_request(&self, job: &QueryJob) -> Result<QueryRequest> {
        let mut request = serde_json::json!({
            "query": job.query,
            "useLegacySql": false,
            "maxResults": self.page_size,
        });

        if let Some(location) = &job.location {
            request["location"] = serde_json::json!(location);
        }
        if let Some(dataset) = &job.default_dataset {
            request["defaultDataset"] = serde_json::json!({
                "projectId": job.project,
                "datasetId": dataset,
            });
        }

        serde_json::from_value(request)
            .map_err(|e| DriverError::Config(format!("could not build query request: {}", e)))
    }

    async fn query_results(
        &self,
        job: &JobRef,
        page_token: Option<&str>,
        schema: &[FieldSchema],
        phase: fn(Option<u16>, String) -> DriverError,
    ) -> Result<WirePage> {
        let params = GetQueryResultsParameters {
            page_token: page_token.map(str::to_string),
            location: job.location.clone(),
            ..Default::default()
        };

        let response = self
            .client()?
            .job()
            .get_query_results(&job.project, &job.job_id, params)
            .await
            .map_err(|e| upstream(&e, phase))?;

        decode_response(&response, job, schema)
    }
}

#[cfg(feature = "bigquery")]
fn decode_response<T: serde::Serialize>(response: &T, job: &JobRef, schema: &[FieldSchema]) -> Result<WirePage> {
    let doc = serde_json::to_value(response)
        .map_err(|e| DriverError::Conversion(format!("unreadable response: {}", e)))?;
    parse_page(&doc, job, schema)
}

/// Map a client error to a driver error of the given phase
#[cfg(feature = "bigquery")]
fn upstream(err: &BQError, phase: fn(Option<u16>, String) -> DriverError) -> DriverError {
    match err {
        BQError::ResponseError { error } => {
            phase(u16::try_from(error.error.code).ok(), error.error.message.clone())
        }
        other => phase(None, other.to_string()),
    }
}

#[cfg(feature = "bigquery")]
fn submission(status: Option<u16>, message: String) -> DriverError {
    DriverError::submission(status, message)
}

#[cfg(feature = "bigquery")]
fn iteration(status: Option<u16>, message: String) -> DriverError {
    DriverError::iteration(status, message)
}

#[cfg(feature = "bigquery")]
fn metadata(status: Option<u16>, message: String) -> DriverError {
    DriverError::warehouse(status, message)
}

#[cfg(feature = "bigquery")]
#[async_trait::async_trait]
impl Warehouse for BigQueryWarehouse {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    async fn submit(&self, job: &QueryJob) -> Result<ResultPage> {
        let request = self.query_request(job)?;

        let response = self
            .client()?
            .job()
            .query(&job.project, request)
            .await
            .map_err(|e| upstream(&e, submission))?;

        let pending = JobRef {
            project: job.project.clone(),
            job_id: String::new(),
            location: job.location.clone(),
        };
        let mut wire = decode_response(&response, &pending, &[])?;

        // jobs.query returns before completion for long-running queries
        while !wire.complete {
            tracing::debug!(job = %wire.page.job.job_id, "Waiting for query job to complete");
            let job_ref = wire.page.job.clone();
            wire = self.query_results(&job_ref, None, &[], submission).await?;
        }

        Ok(wire.page)
    }

    async fn fetch_page(&self, job: &JobRef, page_token: &str, schema: &[FieldSchema]) -> Result<ResultPage> {
        let wire = self.query_results(job, Some(page_token), schema, iteration).await?;
        Ok(wire.page)
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<String>> {
        let client = self.client()?;

        collect_reference_ids("datasets", "datasetReference", "datasetId", |page_token| {
            let client = client.clone();
            async move {
                let mut options = gcp_bigquery_client::dataset::ListOptions::default();
                if let Some(token) = page_token {
                    options = options.page_token(token);
                }

                let list = client
                    .dataset()
                    .list(project, options)
                    .await
                    .map_err(|e| upstream(&e, metadata))?;
                serde_json::to_value(&list).map_err(|e| DriverError::Conversion(e.to_string()))
            }
        })
        .await
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>> {
        let client = self.client()?;

        collect_reference_ids("tables", "tableReference", "tableId", |page_token| {
            let client = client.clone();
            async move {
                let mut options = gcp_bigquery_client::table::ListOptions::default();
                if let Some(token) = page_token {
                    options = options.page_token(token);
                }

                let list = client
                    .table()
                    .list(project, dataset, options)
                    .await
                    .map_err(|e| upstream(&e, metadata))?;
                serde_json::to_value(&list).map_err(|e| DriverError::Conversion(e.to_string()))
            }
        })
        .await
    }

    async fn table_schema(&self, project: &str, dataset: &str, table: &str) -> Result<TableMetadata> {
        let found = self
            .client()?
            .table()
            .get(project, dataset, table, None)
            .await
            .map_err(|e| upstream(&e, metadata))?;

        let doc = serde_json::to_value(&found).map_err(|e| DriverError::Conversion(e.to_string()))?;
        let schema = match doc.get("schema") {
            Some(schema) if !schema.is_null() => parse_table_schema(schema)
                .map_err(|e| DriverError::Conversion(format!("malformed table schema: {}", e)))?,
            _ => Vec::new(),
        };

        Ok(TableMetadata {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            schema,
        })
    }
    /// Drop the authenticated client
    ///
    /// The REST client holds no server-side session; dropping it releases
    /// its token cache and HTTP connection pool.
    async fn close(&self) -> Result<()> {
        let mut client = match self.client.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if client.take().is_some() {
            tracing::debug!("Dropped BigQuery client");
        }
        Ok(())
    }
}

/// Project named by a credentials document (service account or user key)
#[cfg(any(feature = "bigquery", test))]
fn project_from_credentials(doc: &serde_json::Value) -> Option<String> {
    ["project_id", "quota_project_id"]
        .iter()
        .filter_map(|key| doc.get(*key).and_then(|v| v.as_str()))
        .find(|project| !project.is_empty())
        .map(str::to_string)
}

#[cfg(feature = "bigquery")]
async fn credentials_file_project() -> Option<String> {
    let path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok()?;
    let text = tokio::fs::read_to_string(&path).await.ok()?;
    let doc: serde_json::Value = serde_json::from_str(&text).ok()?;
    project_from_credentials(&doc)
}

#[cfg(feature = "bigquery")]
fn discovery_failed(reason: impl std::fmt::Display) -> DriverError {
    DriverError::Authentication(format!(
        "failed to retrieve default project from GCE metadata server: {}",
        reason
    ))
}

#[cfg(feature = "bigquery")]
async fn metadata_server_project() -> Result<String> {

    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()
        .map_err(discovery_failed)?;
    let response = client
        .get(METADATA_PROJECT_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(discovery_failed)?;

    let status = response.status();
    if !status.is_success() {
        return Err(discovery_failed(status));
    }

    let project = response.text().await.map_err(discovery_failed)?.trim().to_string();
    if project.is_empty() {
        return Err(discovery_failed("empty project id"));
    }
    Ok(project)
}

/// Builds authenticated BigQuery clients
#[derive(Debug, Clone, Default)]
pub struct BigQueryFactory {
    page_size: Option<u32>,
}

impl BigQueryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

#[async_trait::async_trait]
impl WarehouseFactory for BigQueryFactory {
    #[cfg(feature = "bigquery")]
    async fn create(&self, settings: &DatasourceSettings, project: &str) -> Result<Arc<dyn Warehouse>> {
        let middleware = TokenMiddleware::from_settings(settings)?;
        tracing::info!(
            datasource = settings.id,
            project,
            jwt = middleware.is_jwt(),
            "Authenticating BigQuery client"
        );

        let mut warehouse = BigQueryWarehouse::connect(&middleware).await?;
        if let Some(page_size) = self.page_size {
            warehouse = warehouse.with_page_size(page_size);
        }

        Ok(Arc::new(warehouse))
    }

    #[cfg(feature = "bigquery")]
    async fn default_project(&self, settings: &DatasourceSettings) -> Result<String> {
        let middleware = TokenMiddleware::from_settings(settings)?;
        if middleware.is_jwt() {
            return Err(DriverError::Config(format!(
                "datasource {} has no default project and none can be discovered",
                settings.id
            )));
        }

        // The ambient credentials must work before their project is trusted
        BigQueryClient::from_application_default_credentials()
            .await
            .map_err(discovery_failed)?;

        let from_env = PROJECT_ENV
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|project| !project.is_empty());
        let project = match from_env {
            Some(project) => project,
            None => match credentials_file_project().await {
                Some(project) => project,
                None => metadata_server_project().await?,
            },
        };

        tracing::info!(datasource = settings.id, project = %project, "Discovered default project");
        Ok(project)
    }

    #[cfg(not(feature = "bigquery"))]
    async fn create(&self, settings: &DatasourceSettings, _project: &str) -> Result<Arc<dyn Warehouse>> {
        TokenMiddleware::from_settings(settings)?;
        Err(DriverError::Config(
            "BigQuery support not compiled. Rebuild with: cargo build --features bigquery".to_string()
        ))
    }
}
