//! GraphQL backend — catalog operations over HTTPS.
//!
//! Issues `POST {registry_url}/graphql` with `Authorization: Bearer
//! {catalog_token}` (the token travels byte-identical, no re-encoding) and
//! body `{"query": …, "variables": …}`. Non-2xx responses and any
//! `errors` array in the payload map to typed errors; a failed call is
//! never shaped into an empty successful result.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{
    BucketInfo, PackageContents, PackageEntry, PackageInfo, SearchHit, SearchResults, SearchScope,
};
use crate::auth::CatalogCredentials;
use crate::{Error, Result};

const SEARCH_QUERY: &str = r"query Search($q: String!, $scope: String!, $bucket: String) {
  search(searchString: $q, scope: $scope, bucket: $bucket) {
    total
    hits { bucket key score size }
  }
}";

const BUCKETS_QUERY: &str = r"query Buckets {
  bucketConfigs { name title description }
}";

const BROWSE_QUERY: &str = r"query Browse($name: String!, $registry: String!) {
  package(name: $name, registry: $registry) {
    metadata
    entries { logicalKey physicalKey size }
  }
}";

const PACKAGES_QUERY: &str = r"query Packages($registry: String!) {
  packages(registry: $registry) { name modified }
}";

/// GraphQL transport for catalog operations.
pub struct GraphQlBackend {
    http: reqwest::Client,
}

impl GraphQlBackend {
    /// Create with a bounded per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Execute a raw GraphQL document, returning the `data` object.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCatalogCredentials`] when the credentials carry no
    ///   bearer token or registry URL.
    /// - [`Error::InvalidToken`] on 401 or unauthenticated `errors` entries.
    /// - [`Error::AuthorizationError`] on 403 or access-denied `errors`
    ///   entries.
    /// - [`Error::Upstream`] on other failures.
    pub async fn execute(
        &self,
        creds: &CatalogCredentials,
        query: &str,
        variables: Value,
    ) -> Result<Value> {
        let (token, registry) = creds.require_graphql()?;
        let url = format!("{}/graphql", registry.trim_end_matches('/'));

        debug!(registry = %registry, "GraphQL request");

        let response = self
            .http
            .post(&url)
            .header("authorization", format!("Bearer {token}"))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        // 401 means the bearer was not authenticated; 403 means it was,
        // but lacks access. The two stay distinct kinds on the wire.
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidToken(
                "catalog did not authenticate the bearer token".to_string(),
            ));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::AuthorizationError(
                "catalog refused access for the bearer token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), body));
        }

        let payload: Value = response.json().await?;

        // A 2xx payload can still carry errors; surface them, never an
        // empty success.
        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(map_graphql_errors(errors));
            }
        }

        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Search the catalog.
    pub async fn search(
        &self,
        creds: &CatalogCredentials,
        query: &str,
        scope: SearchScope,
        bucket: Option<&str>,
    ) -> Result<SearchResults> {
        let scope_str = match scope {
            SearchScope::Objects => "objects",
            SearchScope::Packages => "packages",
        };
        let data = self
            .execute(
                creds,
                SEARCH_QUERY,
                json!({ "q": query, "scope": scope_str, "bucket": bucket }),
            )
            .await?;

        #[derive(Deserialize)]
        struct Wire {
            total: u64,
            hits: Vec<WireHit>,
        }
        #[derive(Deserialize)]
        struct WireHit {
            bucket: String,
            key: String,
            #[serde(default)]
            score: Option<f64>,
            #[serde(default)]
            size: Option<u64>,
        }

        let wire: Wire = serde_json::from_value(field(&data, "search")?)?;
        Ok(SearchResults {
            total: wire.total,
            hits: wire
                .hits
                .into_iter()
                .map(|h| SearchHit {
                    bucket: h.bucket,
                    key: h.key,
                    score: h.score,
                    size: h.size,
                })
                .collect(),
        })
    }

    /// List buckets visible to the caller.
    pub async fn list_buckets(&self, creds: &CatalogCredentials) -> Result<Vec<BucketInfo>> {
        let data = self.execute(creds, BUCKETS_QUERY, json!({})).await?;
        let buckets: Vec<BucketInfo> = serde_json::from_value(field(&data, "bucketConfigs")?)?;
        Ok(buckets)
    }

    /// Browse a package's manifest.
    pub async fn browse_package(
        &self,
        creds: &CatalogCredentials,
        name: &str,
        registry: &str,
    ) -> Result<PackageContents> {
        let data = self
            .execute(
                creds,
                BROWSE_QUERY,
                json!({ "name": name, "registry": registry }),
            )
            .await?;

        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            metadata: Value,
            entries: Vec<WireEntry>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WireEntry {
            logical_key: String,
            #[serde(default)]
            physical_key: Option<String>,
            #[serde(default)]
            size: Option<u64>,
        }

        let wire: Wire = serde_json::from_value(field(&data, "package")?)?;
        Ok(PackageContents {
            name: name.to_string(),
            registry: registry.to_string(),
            metadata: wire.metadata,
            entries: wire
                .entries
                .into_iter()
                .map(|e| PackageEntry {
                    logical_key: e.logical_key,
                    physical_key: e.physical_key,
                    size: e.size,
                })
                .collect(),
        })
    }

    /// List packages in a registry.
    pub async fn list_packages(
        &self,
        creds: &CatalogCredentials,
        registry: &str,
    ) -> Result<Vec<PackageInfo>> {
        let data = self
            .execute(creds, PACKAGES_QUERY, json!({ "registry": registry }))
            .await?;
        let packages: Vec<PackageInfo> = serde_json::from_value(field(&data, "packages")?)?;
        Ok(packages)
    }
}

/// Extract a named field from the `data` object, treating null/absent as
/// an upstream contract violation rather than an empty result.
fn field(data: &Value, name: &str) -> Result<Value> {
    match data.get(name) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(Error::upstream(
            200,
            format!("GraphQL response missing '{name}' in data"),
        )),
    }
}

/// Classify a GraphQL `errors` array into the error taxonomy.
fn map_graphql_errors(errors: &[Value]) -> Error {
    let messages: Vec<String> = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .map(String::from)
        .collect();
    let joined = if messages.is_empty() {
        "GraphQL request failed".to_string()
    } else {
        messages.join("; ")
    };

    let lowered = joined.to_lowercase();
    if lowered.contains("unauthenticated") {
        Error::InvalidToken(joined)
    } else if lowered.contains("unauthorized") || lowered.contains("denied") {
        Error::AuthorizationError(joined)
    } else {
        Error::upstream(200, joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds(registry: &str) -> CatalogCredentials {
        CatalogCredentials {
            catalog_token: Some("t1".into()),
            registry_url: Some(registry.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bearer_header_is_byte_identical() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "search": { "total": 0, "hits": [] } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let results = backend
            .search(&creds(&server.uri()), "readme", SearchScope::Objects, None)
            .await
            .unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn request_body_carries_query_and_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(
                serde_json::json!({ "variables": { "q": "readme", "scope": "packages" } }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "search": { "total": 1, "hits": [
                    { "bucket": "b1", "key": "team/pkg", "score": 0.9 }
                ] } }
            })))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let results = backend
            .search(&creds(&server.uri()), "readme", SearchScope::Packages, None)
            .await
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].key, "team/pkg");
    }

    #[tokio::test]
    async fn http_401_is_an_invalid_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .list_buckets(&creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[tokio::test]
    async fn http_403_is_an_authorization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .list_buckets(&creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationError(_)));
    }

    #[tokio::test]
    async fn unauthenticated_errors_entry_is_an_invalid_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [ { "message": "Unauthenticated request" } ]
            })))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .search(&creds(&server.uri()), "q", SearchScope::Objects, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[tokio::test]
    async fn errors_array_is_never_an_empty_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [ { "message": "Access denied for bucket b1" } ]
            })))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .search(&creds(&server.uri()), "q", SearchScope::Objects, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationError(_)));
    }

    #[tokio::test]
    async fn non_auth_errors_map_to_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [ { "message": "internal resolver failure" } ]
            })))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .execute(&creds(&server.uri()), "query { x }", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_network_call() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and fail differently.
        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let bad = CatalogCredentials {
            registry_url: Some(server.uri()),
            ..Default::default()
        };
        let err = backend
            .search(&bad, "q", SearchScope::Objects, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCatalogCredentials(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn upstream_5xx_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let backend = GraphQlBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .list_buckets(&creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { transient: true, .. }));
    }
}
