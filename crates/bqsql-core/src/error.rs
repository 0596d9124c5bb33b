//! Error taxonomy shared by every layer of the driver

use std::fmt;

/// Result alias used throughout the driver crates
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by the driver
///
/// No component retries on its own: every error travels up the call chain
/// unchanged and the caller decides what to do with it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// Bad or missing settings, detected before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// JWT authentication selected without client email or private key
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Token acquisition or validation failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The warehouse rejected the query text
    #[error("Query submission failed{}: {message}", StatusSuffix(.status))]
    Submission {
        status: Option<u16>,
        message: String,
    },

    /// The warehouse failed while a result was being paged
    #[error("Result iteration failed{}: {message}", StatusSuffix(.status))]
    Iteration {
        status: Option<u16>,
        message: String,
    },

    /// A metadata call (dataset, table or schema listing) failed upstream
    #[error("Warehouse request failed{}: {message}", StatusSuffix(.status))]
    Warehouse {
        status: Option<u16>,
        message: String,
    },

    /// Row/column or record arity disagrees with the declared schema
    #[error("Schema drift: {0}")]
    SchemaDrift(String),

    /// The schema declares a type the converter does not know
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A value does not have the shape its field schema declares
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A query macro is malformed or not supported
    #[error("Macro error: {0}")]
    Macro(String),

    /// The connection was closed before the call
    #[error("Connection closed")]
    ConnectionClosed,

    /// The caller cancelled the in-flight operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The iterator failed earlier and cannot be used again
    #[error("Result iterator is no longer usable after an earlier error")]
    IteratorFailed,
}

impl DriverError {
    /// HTTP-style status reported by the warehouse, if any
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Submission { status, .. }
            | Self::Iteration { status, .. }
            | Self::Warehouse { status, .. } => *status,
            _ => None,
        }
    }

    /// Message as reported by the warehouse for upstream errors
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            Self::Submission { message, .. }
            | Self::Iteration { message, .. }
            | Self::Warehouse { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn submission(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Submission { status, message: message.into() }
    }

    pub fn iteration(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Iteration { status, message: message.into() }
    }

    pub fn warehouse(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Warehouse { status, message: message.into() }
    }
}

struct StatusSuffix<'a>(&'a Option<u16>);

impl fmt::Display for StatusSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(code) => write!(f, " ({})", code),
            None => Ok(()),
        }
    }
}
