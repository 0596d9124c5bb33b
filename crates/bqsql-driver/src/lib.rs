//! Warehouse driver: connections, result iteration and client caching
//!
//! This crate exposes the warehouse through a generic driver surface:
//! a [`Driver`] opens [`Connection`]s, a connection runs queries and hands
//! back [`Rows`], and the [`Registry`] caches clients and connections per
//! tenant so that authentication happens once per key.
//!
//! ## Features
//!
//! - `bigquery` - Google BigQuery support (without it the real factory
//!   returns a configuration error; the mock warehouse is always available)
//!
//! ## Example
//!
//! ```rust,ignore
//! use bqsql_driver::{BigQueryFactory, Registry};
//! use bqsql_core::ConnectionArgs;
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Registry::new(Arc::new(BigQueryFactory::new()));
//! registry.register_settings(settings);
//!
//! let cached = registry.connection(1, &ConnectionArgs::default()).await?;
//! let cancel = CancellationToken::new();
//! let mut rows = cached.connection.query("SELECT 1", &cancel).await?;
//! while let Some(row) = rows.next(&cancel).await? {
//!     println!("{:?}", row);
//! }
//! ```

pub mod warehouse;
pub mod wire;
pub mod auth;
pub mod rows;
pub mod connector;
pub mod api;
pub mod cache;
pub mod bigquery;
pub mod mock;

pub use warehouse::{Warehouse, WarehouseFactory, QueryJob, JobRef, PageRow, ResultPage, TableMetadata};
pub use auth::{TokenMiddleware, TokenSource, DEFAULT_TOKEN_URI};
pub use rows::Rows;
pub use connector::{Driver, Connector, Connection};
pub use api::ApiClient;
pub use cache::{Registry, CachedConnection, ClientKey, ConnectionKey};
pub use bigquery::BigQueryFactory;
#[cfg(feature = "bigquery")]
pub use bigquery::BigQueryWarehouse;
pub use mock::{MockWarehouse, MockFactory};

pub use tokio_util::sync::CancellationToken;
