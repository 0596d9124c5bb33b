//! Error translation for the HTTP routes

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bqsql_core::DriverError;
use serde::Serialize;

/// Structured error body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// Route failures
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is malformed
    #[error("{0}")]
    BadRequest(String),

    /// The driver failed while serving `context`
    #[error("{source}")]
    Driver {
        context: &'static str,
        source: DriverError,
    },

    /// The response could not be serialized
    #[error("{0}")]
    Serialization(String),
}

impl ApiError {
    pub fn driver(context: &'static str) -> impl FnOnce(DriverError) -> ApiError {
        move |source| ApiError::Driver { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(text) => plain(StatusCode::BAD_REQUEST, text),

            ApiError::Driver { context, source } => match (source.upstream_status(), source.upstream_message()) {
                // Errors reported by the warehouse keep its status code
                (Some(code), Some(message)) => {
                    tracing::warn!(context, code, upstream = message, "Warehouse API error");

                    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
                    let body = ErrorBody {
                        error: message.to_string(),
                        message: format!("Google API error: {}", message),
                        code: Some(code),
                    };
                    (status, Json(body)).into_response()
                }
                _ if is_request_error(&source) => {
                    tracing::warn!(context, error = %source, "Request failed");
                    plain(StatusCode::BAD_REQUEST, source.to_string())
                }
                _ => {
                    tracing::error!(context, error = %source, "Error occurred");

                    let body = ErrorBody {
                        error: "Internal server error".to_string(),
                        message: format!("Error in {}", context),
                        code: None,
                    };
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
                }
            },

            ApiError::Serialization(text) => {
                tracing::error!(error = %text, "Response serialization failed");
                plain(StatusCode::INTERNAL_SERVER_ERROR, text)
            }
        }
    }
}

/// Errors the caller can fix: settings, credentials, schema or upstream
/// failures without a status
fn is_request_error(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::Config(_)
            | DriverError::MissingCredentials(_)
            | DriverError::Authentication(_)
            | DriverError::Submission { .. }
            | DriverError::Iteration { .. }
            | DriverError::Warehouse { .. }
            | DriverError::SchemaDrift(_)
            | DriverError::UnsupportedType(_)
            | DriverError::Conversion(_)
            | DriverError::Macro(_)
    )
}

fn plain(status: StatusCode, text: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}
