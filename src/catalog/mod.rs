//! Catalog facade — single entry point for catalog operations.
//!
//! Resolves credentials from the active scope, selects a backend with one
//! deterministic rule, and applies per-operation timeout budgets. Callers
//! get plain structured results; no backend handle escapes this module.

pub mod graphql;
pub mod library;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::auth::{AuthService, CatalogCredentials};
use crate::config::TimeoutsConfig;
use crate::context::{self, Environment};
use crate::{Error, Result};

use graphql::GraphQlBackend;
use library::LibraryBackend;
use types::{BucketInfo, PackageContents, PackageInfo, SearchResults, SearchScope};

/// Which transport a call will use, decided per call from the resolved
/// credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedBackend {
    /// Bearer token against `{registry_url}/graphql`
    GraphQl,
    /// Local interactive session against the registry REST API
    Library,
}

/// Pick a backend from resolved credentials. A bearer token always wins
/// over a cached session; absence of both is an error, never a silent
/// fallback.
///
/// # Errors
///
/// [`Error::MissingCatalogCredentials`] when no usable route exists.
pub fn select_backend(creds: &CatalogCredentials) -> Result<SelectedBackend> {
    if creds.has_bearer_token() {
        if creds.registry_url.as_deref().is_some_and(|u| !u.is_empty()) {
            return Ok(SelectedBackend::GraphQl);
        }
        return Err(Error::MissingCatalogCredentials(
            "bearer token present but no registry URL to send it to".to_string(),
        ));
    }
    if creds.local_session.is_some() {
        return Ok(SelectedBackend::Library);
    }
    Err(Error::MissingCatalogCredentials(
        "no catalog bearer token and no local session".to_string(),
    ))
}

/// Facade over the catalog backends.
pub struct CatalogService {
    auth: Arc<dyn AuthService>,
    graphql: GraphQlBackend,
    library: LibraryBackend,
    timeouts: TimeoutsConfig,
    // Selection memo for long-lived single-user processes. HTTP scopes
    // re-evaluate every call; a desktop scope's credentials cannot change
    // mid-process, so the first selection holds.
    desktop_selection: OnceCell<SelectedBackend>,
}

impl CatalogService {
    /// Build the facade around an authentication service.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(auth: Arc<dyn AuthService>, timeouts: TimeoutsConfig) -> Result<Self> {
        // Client-level timeout is the widest budget; each operation is
        // additionally bounded by its own budget below.
        let widest = timeouts.discovery.max(timeouts.query);
        Ok(Self {
            auth,
            graphql: GraphQlBackend::new(widest)?,
            library: LibraryBackend::new(widest)?,
            timeouts,
            desktop_selection: OnceCell::new(),
        })
    }

    /// Search the catalog.
    ///
    /// # Errors
    ///
    /// Credential, backend, and timeout errors bubble unchanged; a failed
    /// call never comes back as an empty result set.
    pub async fn search(
        &self,
        query: &str,
        scope: SearchScope,
        bucket: Option<&str>,
    ) -> Result<SearchResults> {
        let (creds, backend) = self.route().await?;
        let fut = async {
            match backend {
                SelectedBackend::GraphQl => {
                    self.graphql.search(&creds, query, scope, bucket).await
                }
                SelectedBackend::Library => {
                    self.library
                        .search(required_session(&creds)?, query, scope, bucket)
                        .await
                }
            }
        };
        bounded("search", self.timeouts.query, fut).await
    }

    /// List buckets visible to the caller. Permission discovery can fan
    /// out across many buckets, so it gets the wide budget.
    ///
    /// # Errors
    ///
    /// Credential, backend, and timeout errors bubble unchanged.
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let (creds, backend) = self.route().await?;
        let fut = async {
            match backend {
                SelectedBackend::GraphQl => self.graphql.list_buckets(&creds).await,
                SelectedBackend::Library => {
                    self.library.list_buckets(required_session(&creds)?).await
                }
            }
        };
        bounded("list_buckets", self.timeouts.discovery, fut).await
    }

    /// Browse a package's manifest.
    ///
    /// # Errors
    ///
    /// Credential, backend, and timeout errors bubble unchanged.
    pub async fn browse_package(&self, name: &str, registry: &str) -> Result<PackageContents> {
        let (creds, backend) = self.route().await?;
        let fut = async {
            match backend {
                SelectedBackend::GraphQl => {
                    self.graphql.browse_package(&creds, name, registry).await
                }
                SelectedBackend::Library => {
                    self.library
                        .browse_package(required_session(&creds)?, name, registry)
                        .await
                }
            }
        };
        bounded("browse_package", self.timeouts.query, fut).await
    }

    /// Execute a raw GraphQL document.
    ///
    /// # Errors
    ///
    /// Credential, backend, and timeout errors bubble unchanged.
    pub async fn execute_graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let (creds, backend) = self.route().await?;
        let fut = async {
            match backend {
                SelectedBackend::GraphQl => self.graphql.execute(&creds, query, variables).await,
                SelectedBackend::Library => {
                    self.library
                        .execute_graphql(required_session(&creds)?, query, variables)
                        .await
                }
            }
        };
        bounded("execute_graphql", self.timeouts.query, fut).await
    }

    /// List packages in a registry.
    ///
    /// # Errors
    ///
    /// Credential, backend, and timeout errors bubble unchanged.
    pub async fn list_packages(&self, registry: &str) -> Result<Vec<PackageInfo>> {
        let (creds, backend) = self.route().await?;
        let fut = async {
            match backend {
                SelectedBackend::GraphQl => self.graphql.list_packages(&creds, registry).await,
                SelectedBackend::Library => {
                    self.library
                        .list_packages(required_session(&creds)?, registry)
                        .await
                }
            }
        };
        bounded("list_packages", self.timeouts.discovery, fut).await
    }

    /// Resolve credentials from the current scope and select a backend.
    async fn route(&self) -> Result<(CatalogCredentials, SelectedBackend)> {
        let auth_state = context::current_auth();
        let creds = self.auth.catalog_credentials(auth_state.as_ref()).await?;

        // A bearer presented by the current scope must reach the wire
        // byte-identical. A resolver that drops or replaces it holds a
        // fixed identity and would answer this caller from someone else's
        // session.
        if let Some(scoped) = auth_state
            .as_ref()
            .and_then(|a| a.claim_str("catalog_token"))
            .filter(|t| !t.is_empty())
        {
            if creds.catalog_token.as_deref() != Some(scoped) {
                warn!(mode = %self.auth.mode(), "scope bearer token not honored by credential resolver");
                return Err(Error::AuthorizationError(format!(
                    "the request carries its own catalog token, but the {} auth service \
                     resolves a fixed identity and cannot honor it",
                    self.auth.mode()
                )));
            }
        }

        let backend = if context::current_environment() == Environment::Desktop {
            *self
                .desktop_selection
                .get_or_try_init(|| async { select_backend(&creds) })
                .await?
        } else {
            select_backend(&creds)?
        };
        debug!(backend = ?backend, mode = %self.auth.mode(), "catalog route");
        Ok((creds, backend))
    }
}

fn required_session(creds: &CatalogCredentials) -> Result<&crate::auth::session::LocalSession> {
    creds.local_session.as_ref().ok_or_else(|| {
        Error::MissingCatalogCredentials("library route selected without a session".to_string())
    })
}

async fn bounded<T>(
    operation: &'static str,
    budget: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, budget_ms = budget.as_millis() as u64, "operation timed out");
            Err(Error::Timeout {
                operation: operation.to_string(),
                budget,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::LocalSession;

    fn session() -> LocalSession {
        LocalSession {
            catalog_url: "https://c".into(),
            registry_url: "https://r".into(),
            access_token: "s".into(),
            expires_at: None,
        }
    }

    #[test]
    fn bearer_with_registry_selects_graphql() {
        let creds = CatalogCredentials {
            catalog_token: Some("t1".into()),
            registry_url: Some("https://r".into()),
            ..Default::default()
        };
        assert_eq!(select_backend(&creds).unwrap(), SelectedBackend::GraphQl);
    }

    #[test]
    fn bearer_wins_over_local_session() {
        let creds = CatalogCredentials {
            catalog_token: Some("t1".into()),
            registry_url: Some("https://r".into()),
            local_session: Some(session()),
            ..Default::default()
        };
        assert_eq!(select_backend(&creds).unwrap(), SelectedBackend::GraphQl);
    }

    #[test]
    fn bearer_without_registry_is_an_error_not_a_fallback() {
        let creds = CatalogCredentials {
            catalog_token: Some("t1".into()),
            local_session: Some(session()),
            ..Default::default()
        };
        let err = select_backend(&creds).unwrap_err();
        assert!(matches!(err, Error::MissingCatalogCredentials(_)));
    }

    #[test]
    fn session_alone_selects_library() {
        let creds = CatalogCredentials {
            local_session: Some(session()),
            ..Default::default()
        };
        assert_eq!(select_backend(&creds).unwrap(), SelectedBackend::Library);
    }

    #[test]
    fn empty_bearer_token_does_not_count() {
        let creds = CatalogCredentials {
            catalog_token: Some(String::new()),
            registry_url: Some("https://r".into()),
            local_session: Some(session()),
            ..Default::default()
        };
        assert_eq!(select_backend(&creds).unwrap(), SelectedBackend::Library);
    }

    #[test]
    fn nothing_resolvable_is_an_error() {
        let err = select_backend(&CatalogCredentials::default()).unwrap_err();
        assert!(matches!(err, Error::MissingCatalogCredentials(_)));
    }
}
