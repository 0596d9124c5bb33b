//! HTTP resource routes
//!
//! Lists datasets, tables and table schemas of a tenant's project for UI
//! autocomplete, translating driver errors into HTTP responses.

pub mod error;
pub mod routes;

pub use error::{ApiError, ErrorBody};
pub use routes::{router, serve, AppState, DATASOURCE_HEADER};
