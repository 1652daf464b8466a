//! JWT auth service — stateless per-request credential resolution.
//!
//! A bearer token *conveys* pre-existing authentication; it never
//! manufactures it. Cloud credentials come from a time-boxed role
//! assumption against the `role_arn` claim; catalog credentials are read
//! directly from the `catalog_token` / `catalog_url` / `registry_url`
//! claims. A claim set lacking `catalog_token` is a loud
//! [`Error::MissingCatalogCredentials`], never a silently empty result.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sts::StsClient;
use super::{AuthMode, AuthService, AuthState, AwsCredentials, CatalogCredentials};
use crate::{Error, Result};

/// Claim schema carried by request bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestClaims {
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued-at (Unix timestamp)
    pub iat: u64,
    /// Expiry (Unix timestamp)
    pub exp: u64,
    /// Subject (caller identity)
    pub sub: String,
    /// Target role for scoped cloud access
    #[serde(default)]
    pub role_arn: Option<String>,
    /// Session tags applied during role assumption
    #[serde(default)]
    pub session_tags: HashMap<String, String>,
    /// Catalog bearer token (pre-existing authentication)
    #[serde(default)]
    pub catalog_token: Option<String>,
    /// Catalog UI URL
    #[serde(default)]
    pub catalog_url: Option<String>,
    /// Registry API URL
    #[serde(default)]
    pub registry_url: Option<String>,
}

impl RequestClaims {
    /// Copy the claims verbatim into an [`AuthState`] for the request scope.
    #[must_use]
    pub fn to_auth_state(&self, raw_token: &str) -> AuthState {
        let mut state = AuthState::new("jwt");
        state.access_token = Some(raw_token.to_string());
        let json = serde_json::to_value(self).unwrap_or_default();
        if let serde_json::Value::Object(map) = json {
            state.claims = map.into_iter().collect();
        }
        state
    }

    /// Rebuild claims from a scope's [`AuthState`] claim map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] when the map does not carry the
    /// mandatory claim fields.
    pub fn from_auth_state(auth: &AuthState) -> Result<Self> {
        let value = serde_json::Value::Object(auth.claims.clone().into_iter().collect());
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidToken(format!("claim schema mismatch: {e}")))
    }
}

/// Stateless auth service for JWT mode.
///
/// Construction never fails; all validation happens at per-request claim
/// resolution time.
pub struct JwtAuthService {
    sts: StsClient,
}

impl JwtAuthService {
    /// Create with the STS client used for role assumption.
    #[must_use]
    pub fn new(sts: StsClient) -> Self {
        Self { sts }
    }

    fn claims(auth: Option<&AuthState>) -> Result<RequestClaims> {
        let auth = auth.ok_or(Error::MissingCredentials)?;
        RequestClaims::from_auth_state(auth)
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    fn mode(&self) -> AuthMode {
        AuthMode::Jwt
    }

    async fn aws_credentials(&self, auth: Option<&AuthState>) -> Result<AwsCredentials> {
        let claims = Self::claims(auth)?;
        let role_arn = claims.role_arn.as_deref().ok_or_else(|| {
            Error::AuthorizationError("token carries no role_arn claim".to_string())
        })?;

        // Session name is the subject, truncated to the STS limit.
        let session_name: String = claims.sub.chars().take(64).collect();

        // The gateway's ambient credentials sign the assumption request.
        let signer = super::iam::ambient_credentials()?;

        self.sts
            .assume_role(&signer, role_arn, &session_name, &claims.session_tags)
            .await
    }

    async fn catalog_credentials(&self, auth: Option<&AuthState>) -> Result<CatalogCredentials> {
        let claims = Self::claims(auth)?;

        if claims.catalog_token.as_deref().map_or(true, str::is_empty) {
            return Err(Error::MissingCatalogCredentials(
                "token missing catalog_token claim".to_string(),
            ));
        }

        Ok(CatalogCredentials {
            aws_role_arn: claims.role_arn.clone(),
            session_tags: claims.session_tags.clone(),
            catalog_token: claims.catalog_token.clone(),
            catalog_url: claims.catalog_url.clone(),
            registry_url: claims.registry_url.clone(),
            local_session: None,
        })
    }
}
