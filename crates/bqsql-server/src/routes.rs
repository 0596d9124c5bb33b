//! Metadata and listing routes
//!
//! Thin proxies over the warehouse metadata API for UI autocomplete. Listing
//! routes are `POST`s taking `{project, location, dataset, table}` as JSON;
//! the tenant comes from the `X-Datasource-Id` header.

use crate::error::ApiError;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bqsql_driver::{ApiClient, Registry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Header naming the tenant a request is for
pub const DATASOURCE_HEADER: &str = "x-datasource-id";

/// Shared route state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,

    /// Tenant used when a request carries no datasource header
    pub default_datasource: Option<i64>,
}

/// Request body shared by every route
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRequest {
    #[serde(default)]
    project: String,

    #[serde(default)]
    location: String,

    #[serde(default)]
    dataset: String,

    #[serde(default)]
    table: String,

    #[serde(default)]
    is_orderable: bool,
}

/// Create router with all endpoints
pub fn router(registry: Arc<Registry>, default_datasource: Option<i64>) -> Router {
    Router::new()
        .route("/datasets", post(datasets))
        .route("/dataset/tables", post(tables))
        .route("/dataset/table/schema", post(table_schema))
        .route("/dataset/table/columns", post(columns))
        .route("/default-project", post(default_project))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            registry,
            default_datasource,
        })
}

/// Start the HTTP server
pub async fn serve(addr: &str, registry: Arc<Registry>, default_datasource: Option<i64>) -> std::io::Result<()> {
    let app = router(registry, default_datasource);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Resource API listening");

    axum::serve(listener, app).await
}

async fn datasets(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Response, ApiError> {
    let (client, _) = resolve(&state, &headers, &body, "datasets").await?;

    let datasets = client.list_datasets().await.map_err(ApiError::driver("datasets"))?;
    json(&datasets)
}

async fn tables(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Response, ApiError> {
    let (client, request) = resolve(&state, &headers, &body, "tables").await?;
    require("dataset", &request.dataset)?;

    let tables = client.list_tables(&request.dataset).await.map_err(ApiError::driver("tables"))?;
    json(&tables)
}

async fn table_schema(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Response, ApiError> {
    let (client, request) = resolve(&state, &headers, &body, "table schema").await?;
    require("dataset", &request.dataset)?;
    require("table", &request.table)?;

    let metadata = client
        .table_schema(&request.dataset, &request.table)
        .await
        .map_err(ApiError::driver("table schema"))?;
    json(&metadata)
}

async fn columns(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Response, ApiError> {
    let (client, request) = resolve(&state, &headers, &body, "columns").await?;
    require("dataset", &request.dataset)?;
    require("table", &request.table)?;

    let columns = client
        .columns(&request.dataset, &request.table, request.is_orderable)
        .await
        .map_err(ApiError::driver("columns"))?;
    json(&columns)
}

/// Project the tenant runs in when a request names none
async fn default_project(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let tenant = tenant(&state, &headers)?;

    let project = state
        .registry
        .default_project(tenant)
        .await
        .map_err(ApiError::driver("default project"))?;
    json(&project)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Parse the body, pick the tenant and fetch its cached client
async fn resolve(
    state: &AppState,
    headers: &HeaderMap,
    body: &str,
    context: &'static str,
) -> Result<(Arc<ApiClient>, ResourceRequest), ApiError> {
    let request: ResourceRequest = serde_json::from_str(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let tenant = tenant(state, headers)?;

    let client = state
        .registry
        .client(tenant, &request.project, &request.location)
        .await
        .map_err(ApiError::driver(context))?;

    Ok((client, request))
}

fn tenant(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    match headers.get(DATASOURCE_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("invalid {} header", DATASOURCE_HEADER))),
        None => state
            .default_datasource
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", DATASOURCE_HEADER))),
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        Err(ApiError::BadRequest(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn json<T: Serialize>(value: &T) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bqsql_driver::{MockFactory, MockWarehouse};

    fn state(default_datasource: Option<i64>) -> AppState {
        AppState {
            registry: Arc::new(Registry::new(Arc::new(MockFactory::new(MockWarehouse::new())))),
            default_datasource,
        }
    }

    #[test]
    fn test_tenant_from_header_or_default() {
        let mut headers = HeaderMap::new();
        assert!(matches!(tenant(&state(None), &headers), Err(ApiError::BadRequest(_))));
        assert_eq!(tenant(&state(Some(3)), &headers).unwrap(), 3);

        headers.insert(DATASOURCE_HEADER, "7".parse().unwrap());
        assert_eq!(tenant(&state(Some(3)), &headers).unwrap(), 7);

        headers.insert(DATASOURCE_HEADER, "seven".parse().unwrap());
        assert!(matches!(tenant(&state(Some(3)), &headers), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_request_body_defaults() {
        let request: ResourceRequest = serde_json::from_str(r#"{"dataset":"sales","isOrderable":true}"#).unwrap();
        assert_eq!(request.dataset, "sales");
        assert!(request.project.is_empty());
        assert!(request.is_orderable);
    }
}
