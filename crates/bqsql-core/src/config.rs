//! Configuration schema (bqsql.toml)
//!
//! Datasource settings are loaded once per tenant and never mutated in place
//! except by explicit reconfiguration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings of one datasource (tenant)
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasourceSettings {
    /// Datasource identifier
    #[serde(default)]
    pub id: i64,

    /// Project used when a query does not name one
    #[serde(default, alias = "defaultProject")]
    pub default_project: String,

    /// Processing location used when a query does not name one
    #[serde(default, alias = "processingLocation")]
    pub processing_location: String,

    /// Authentication mode: `gce` or `jwt`
    #[serde(default, alias = "authenticationType")]
    pub authentication_type: String,

    /// Service account email (jwt)
    #[serde(default, alias = "clientEmail")]
    pub client_email: String,

    /// Service account private key (jwt)
    #[serde(default, alias = "privateKey", skip_serializing)]
    pub private_key: String,

    /// Token endpoint (jwt)
    #[serde(default, alias = "tokenUri")]
    pub token_uri: String,

    /// Last time the datasource was reconfigured
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl DatasourceSettings {
    /// Load settings from datasource JSON plus the decrypted private key
    ///
    /// The private key is kept out of the JSON document and supplied
    /// separately, as secrets usually are.
    pub fn from_json(id: i64, json_data: &str, private_key: Option<&str>) -> Result<Self, ConfigError> {
        let mut settings: DatasourceSettings = serde_json::from_str(json_data)
            .map_err(|e| ConfigError::ParseError(format!("could not unmarshal datasource json: {}", e)))?;

        settings.id = id;
        if let Some(key) = private_key {
            settings.private_key = key.to_string();
        }

        Ok(settings)
    }
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("id", &self.id)
            .field("default_project", &self.default_project)
            .field("processing_location", &self.processing_location)
            .field("authentication_type", &self.authentication_type)
            .field("client_email", &self.client_email)
            .field("private_key", &if self.private_key.is_empty() { "" } else { "<redacted>" })
            .field("token_uri", &self.token_uri)
            .field("updated", &self.updated)
            .finish()
    }
}

/// Per-query connection arguments
///
/// Empty fields fall back to the datasource defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionArgs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataset: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}

impl ConnectionArgs {
    /// Parse connection arguments from raw query JSON; absent JSON is empty
    pub fn from_json(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                .map_err(|e| ConfigError::ParseError(format!("error reading query params: {}", e))),
            _ => Ok(Self::default()),
        }
    }
}

/// Settings a single connection is opened with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub project: String,
    pub dataset: String,
    pub location: String,
    pub authentication_type: String,
}

impl ConnectionSettings {
    /// Resolve datasource defaults against per-query arguments
    pub fn resolve(settings: &DatasourceSettings, args: &ConnectionArgs) -> Self {
        let pick = |arg: &str, default: &str| {
            if arg.is_empty() { default.to_string() } else { arg.to_string() }
        };

        Self {
            project: pick(&args.project, &settings.default_project),
            dataset: args.dataset.clone(),
            location: pick(&args.location, &settings.processing_location),
            authentication_type: settings.authentication_type.clone(),
        }
    }
}

/// HTTP route server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Datasource used when a request names none
    #[serde(default)]
    pub default_datasource: Option<i64>,
}

fn default_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            default_datasource: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Configured datasources
    #[serde(default, rename = "datasource")]
    pub datasources: Vec<DatasourceSettings>,

    /// HTTP route server
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for ds in &config.datasources {
            if !seen.insert(ds.id) {
                return Err(ConfigError::ParseError(format!("duplicate datasource id {}", ds.id)));
            }
        }

        Ok(config)
    }

    /// Look up a datasource by id
    pub fn datasource(&self, id: i64) -> Option<&DatasourceSettings> {
        self.datasources.iter().find(|d| d.id == id)
    }

    /// Save config to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
