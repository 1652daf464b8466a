//! Authentication services and credential types.
//!
//! One [`AuthService`] exists per process, selected once by
//! [`factory::auth_service`] with fixed precedence (API key, then JWT,
//! then ambient IAM). JWT mode is stateless: the memoized service holds no
//! caller state and resolves credentials fresh from the claims of the
//! current [`crate::context`] scope on every call.

pub mod api_key;
pub mod factory;
pub mod iam;
pub mod jwt;
pub mod session;
pub mod sts;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::context::AuthState;
use crate::{Error, Result};

/// Which authentication mode the process runs in, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Ambient cloud credentials + optional local catalog session
    Iam,
    /// Explicit catalog API key, exchanged once at startup
    ApiKey,
    /// Per-request bearer JWT (stateless multi-tenant)
    Jwt,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Iam => "iam",
            Self::ApiKey => "api_key",
            Self::Jwt => "jwt",
        };
        f.write_str(s)
    }
}

/// Short-lived scoped cloud credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token, present for assumed-role credentials
    pub session_token: Option<String>,
    /// When these credentials expire, if bounded
    pub expiration: Option<DateTime<Utc>>,
}

/// Credentials for catalog operations, derived on demand from the current
/// scope. Never persisted beyond the owning scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogCredentials {
    /// Target role for scoped cloud access (JWT mode)
    pub aws_role_arn: Option<String>,
    /// Session tags applied during role assumption
    #[serde(default)]
    pub session_tags: HashMap<String, String>,
    /// Catalog bearer token; conveys prior authentication. Present for
    /// per-request JWTs and API-key exchanges, never for a local session.
    pub catalog_token: Option<String>,
    /// Catalog UI URL
    pub catalog_url: Option<String>,
    /// Registry API URL
    pub registry_url: Option<String>,
    /// Local authenticated session (desktop/IAM mode only)
    #[serde(skip)]
    pub local_session: Option<session::LocalSession>,
}

impl CatalogCredentials {
    /// Validate this credential set for a GraphQL call.
    ///
    /// The GraphQL backend requires both the bearer token and a registry
    /// URL; presence of only one is an error state, never silently
    /// degraded to the library path.
    pub fn require_graphql(&self) -> Result<(&str, &str)> {
        let token = self.catalog_token.as_deref().ok_or_else(|| {
            Error::MissingCatalogCredentials(
                "catalog bearer token absent from resolved credentials".to_string(),
            )
        })?;
        let registry = self.registry_url.as_deref().ok_or_else(|| {
            Error::MissingCatalogCredentials(
                "registry_url absent from resolved credentials".to_string(),
            )
        })?;
        Ok((token, registry))
    }

    /// Whether a bearer token is present (GraphQL routing signal).
    #[must_use]
    pub fn has_bearer_token(&self) -> bool {
        self.catalog_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Credential resolution for the current scope.
///
/// IAM and API-key implementations ignore `auth` (their identity is fixed
/// at construction); the JWT implementation reads everything from it.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// The mode this service was constructed for.
    fn mode(&self) -> AuthMode;

    /// Resolve cloud credentials for the current scope.
    async fn aws_credentials(&self, auth: Option<&AuthState>) -> Result<AwsCredentials>;

    /// Resolve catalog credentials for the current scope.
    async fn catalog_credentials(&self, auth: Option<&AuthState>) -> Result<CatalogCredentials>;
}
