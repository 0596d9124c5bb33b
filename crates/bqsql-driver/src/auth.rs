//! Token middleware selection for a datasource
//!
//! Authentication is resolved from the datasource settings before any
//! network call is made, so a misconfigured tenant fails fast with a
//! configuration error instead of an opaque upstream failure.

use bqsql_core::{DatasourceSettings, DriverError, Result};

/// Token endpoint used when the settings leave it empty
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Where access tokens come from
#[derive(Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Ambient machine identity (metadata server / application default credentials)
    Gce,

    /// Service account key exchanged at the token endpoint
    Jwt {
        client_email: String,
        private_key: String,
        token_uri: String,
    },
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gce => f.write_str("Gce"),
            Self::Jwt { client_email, token_uri, .. } => f
                .debug_struct("Jwt")
                .field("client_email", client_email)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
        }
    }
}

/// Credential configuration attached to every client built for a tenant
///
/// OAuth scopes are not configurable; the BigQuery client requests its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMiddleware {
    pub datasource_id: i64,
    pub source: TokenSource,
}

impl TokenMiddleware {
    /// Select the middleware for a datasource
    ///
    /// `gce` uses the ambient identity. `jwt` requires a client email and a
    /// private key. Anything else is rejected.
    pub fn from_settings(settings: &DatasourceSettings) -> Result<Self> {
        let source = match settings.authentication_type.as_str() {
            "gce" => TokenSource::Gce,
            "jwt" => {
                if settings.client_email.is_empty() || settings.private_key.is_empty() {
                    return Err(DriverError::MissingCredentials(format!(
                        "datasource {} is missing either client email or private key",
                        settings.id
                    )));
                }

                let token_uri = if settings.token_uri.is_empty() {
                    DEFAULT_TOKEN_URI.to_string()
                } else {
                    settings.token_uri.clone()
                };

                TokenSource::Jwt {
                    client_email: settings.client_email.clone(),
                    private_key: settings.private_key.clone(),
                    token_uri,
                }
            }
            "" => {
                return Err(DriverError::Config(format!(
                    "datasource {} has no authentication type",
                    settings.id
                )))
            }
            other => {
                return Err(DriverError::Config(format!(
                    "invalid authentication type '{}' for datasource {}",
                    other, settings.id
                )))
            }
        };

        Ok(Self {
            datasource_id: settings.id,
            source,
        })
    }

    pub fn is_jwt(&self) -> bool {
        matches!(self.source, TokenSource::Jwt { .. })
    }
}
