//! Error types for the catalog gateway

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the catalog gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Catalog gateway errors
///
/// Authentication failures are distinct variants so they can never be
/// mistaken for a legitimate empty result set. They bubble unchanged
/// through [`crate::catalog::CatalogService`] to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// No credentials resolved at all — fatal for any catalog call
    #[error("No credentials available for this request")]
    MissingCredentials,

    /// Inbound bearer token failed signature or claim validation
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Role assumption or catalog access denied
    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    /// Cloud credentials resolved but the catalog bearer token is absent
    #[error("Catalog credentials missing: {0}")]
    MissingCatalogCredentials(String),

    /// Backend call failed
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status reported by the backend (0 if none)
        status: u16,
        /// Error detail from the backend
        message: String,
        /// Whether retrying could plausibly succeed
        transient: bool,
    },

    /// A bounded operation exceeded its deadline
    #[error("Operation '{operation}' timed out after {budget:?}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// The budget that was exceeded
        budget: Duration,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build an [`Error::Upstream`] from an HTTP status and message.
    ///
    /// 5xx and 429 are classified transient; everything else permanent.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            transient: status >= 500 || status == 429,
        }
    }

    /// Machine-readable error kind for wire responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidToken(_) => "invalid_token",
            Self::AuthorizationError(_) => "authorization_error",
            Self::MissingCatalogCredentials(_) => "missing_catalog_credentials",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Http(_) => "http_error",
        }
    }

    /// Human remediation hint, where one exists.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredentials => {
                Some("Re-authenticate: open a local session or present a bearer token")
            }
            Self::InvalidToken(_) => Some("Obtain a fresh token and retry the request"),
            Self::AuthorizationError(_) => {
                Some("Verify the role trust policy and your session permissions")
            }
            Self::MissingCatalogCredentials(_) => {
                Some("Token missing catalog_token claim; re-authenticate against the catalog")
            }
            _ => None,
        }
    }

    /// HTTP status this error maps to at the service boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationError(_) => StatusCode::FORBIDDEN,
            Self::MissingCatalogCredentials(_) => StatusCode::PRECONDITION_FAILED,
            Self::Upstream { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
