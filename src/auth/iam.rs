//! IAM auth service — ambient cloud credentials plus an optional local
//! catalog session (desktop mode default).

use std::env;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::session::{self, LocalSession};
use super::{AuthMode, AuthService, AuthState, AwsCredentials, CatalogCredentials};
use crate::{Error, Result};

/// Resolve ambient cloud credentials from the environment chain.
///
/// # Errors
///
/// Returns [`Error::MissingCredentials`] when no access key pair is set —
/// in IAM mode this is a fatal startup condition.
pub fn ambient_credentials() -> Result<AwsCredentials> {
    let access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
    let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();

    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key))
            if !access_key_id.is_empty() && !secret_access_key.is_empty() =>
        {
            Ok(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty()),
                expiration: None,
            })
        }
        _ => Err(Error::MissingCredentials),
    }
}

/// Auth service backed by ambient cloud credentials and a pre-existing
/// local catalog session, when one exists.
pub struct IamAuthService {
    ambient: AwsCredentials,
    session: Option<LocalSession>,
}

impl IamAuthService {
    /// Construct from the ambient environment and the default session path.
    ///
    /// # Errors
    ///
    /// Fails fast when no ambient cloud credentials are available. A
    /// missing session file is not an error — catalog operations will
    /// report `MissingCatalogCredentials` at call time instead.
    pub fn new() -> Result<Self> {
        let path = session::default_session_path()
            .ok_or_else(|| Error::Config("Cannot determine config directory".to_string()))?;
        Self::with_session_path(path)
    }

    /// Construct with an explicit session file path (test seam).
    pub fn with_session_path(path: PathBuf) -> Result<Self> {
        let ambient = ambient_credentials()?;
        let session = session::load_session(&path)?;

        match &session {
            Some(s) => info!(catalog = %s.catalog_url, "Loaded local catalog session"),
            None => debug!("No local catalog session; catalog operations need a prior login"),
        }

        Ok(Self { ambient, session })
    }
}

#[async_trait]
impl AuthService for IamAuthService {
    fn mode(&self) -> AuthMode {
        AuthMode::Iam
    }

    async fn aws_credentials(&self, _auth: Option<&AuthState>) -> Result<AwsCredentials> {
        Ok(self.ambient.clone())
    }

    async fn catalog_credentials(&self, _auth: Option<&AuthState>) -> Result<CatalogCredentials> {
        let session = self.session.as_ref().ok_or_else(|| {
            Error::MissingCatalogCredentials(
                "no local catalog session; run an interactive login first".to_string(),
            )
        })?;

        // No bearer token: the library backend consumes the session natively.
        Ok(CatalogCredentials {
            aws_role_arn: None,
            session_tags: std::collections::HashMap::new(),
            catalog_token: None,
            catalog_url: Some(session.catalog_url.clone()),
            registry_url: Some(session.registry_url.clone()),
            local_session: Some(session.clone()),
        })
    }
}
