//! API-key auth service — one-time catalog login at construction.
//!
//! The supplied key is exchanged against the registry for a catalog bearer
//! token and derived cloud credentials. Both are cached for the process
//! lifetime; rejection of the key is a fatal construction error.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::{AuthMode, AuthService, AuthState, AwsCredentials, CatalogCredentials};
use crate::{Error, Result};

/// Registry response to an API-key exchange.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    #[serde(default)]
    catalog_url: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    aws: Option<ExchangeAwsCredentials>,
}

#[derive(Debug, Deserialize)]
struct ExchangeAwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

/// Auth service holding credentials exchanged from an explicit API key.
pub struct ApiKeyAuthService {
    registry_url: String,
    catalog_url: Option<String>,
    catalog_token: String,
    aws: AwsCredentials,
}

impl fmt::Debug for ApiKeyAuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthService")
            .field("registry_url", &self.registry_url)
            .field("catalog_url", &self.catalog_url)
            .field("catalog_token", &"<redacted>")
            .field("aws", &"<redacted>")
            .finish()
    }
}

impl ApiKeyAuthService {
    /// Exchange `api_key` against `{registry_url}/api/auth/exchange`.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthorizationError`] when the registry rejects the key.
    /// - [`Error::Config`] when the registry URL is missing, or the
    ///   exchange response carries no cloud credentials.
    pub async fn login(registry_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if registry_url.is_empty() {
            return Err(Error::Config(
                "API-key mode requires catalog.registry_url".to_string(),
            ));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let url = format!("{}/api/auth/exchange", registry_url.trim_end_matches('/'));

        let response = http
            .post(&url)
            .json(&serde_json::json!({ "api_key": api_key }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::AuthorizationError(
                "catalog rejected the configured API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), body));
        }

        let exchange: ExchangeResponse = response.json().await?;
        let aws = exchange.aws.ok_or_else(|| {
            Error::Config("API-key exchange response carried no cloud credentials".to_string())
        })?;

        info!(registry = %registry_url, "API-key login succeeded");

        Ok(Self {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            catalog_url: exchange.catalog_url,
            catalog_token: exchange.access_token,
            aws: AwsCredentials {
                access_key_id: aws.access_key_id,
                secret_access_key: aws.secret_access_key,
                session_token: aws.session_token,
                expiration: aws.expiration.or(exchange.expires_at),
            },
        })
    }
}

#[async_trait]
impl AuthService for ApiKeyAuthService {
    fn mode(&self) -> AuthMode {
        AuthMode::ApiKey
    }

    async fn aws_credentials(&self, _auth: Option<&AuthState>) -> Result<AwsCredentials> {
        Ok(self.aws.clone())
    }

    async fn catalog_credentials(&self, _auth: Option<&AuthState>) -> Result<CatalogCredentials> {
        Ok(CatalogCredentials {
            aws_role_arn: None,
            session_tags: HashMap::new(),
            catalog_token: Some(self.catalog_token.clone()),
            catalog_url: self.catalog_url.clone(),
            registry_url: Some(self.registry_url.clone()),
            local_session: None,
        })
    }
}
