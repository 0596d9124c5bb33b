//! bqsql Core
//!
//! Core domain model shared by the driver, the HTTP routes and the CLI:
//! result schemas, the native and generic value models, the value converter
//! and the persisted datasource configuration.

pub mod error;
pub mod schema;
pub mod value;
pub mod format;
pub mod convert;
pub mod decode;
pub mod config;
pub mod macros;

pub use error::{DriverError, Result};
pub use schema::{TypeTag, FieldSchema};
pub use value::{NativeValue, GenericValue, Record, IntervalValue, RangeValue};
pub use convert::{convert, convert_row};
pub use decode::{decode_cell, decode_row};
pub use macros::interpolate;
pub use config::{Config, ConfigError, DatasourceSettings, ConnectionArgs, ConnectionSettings, ServerConfig};
