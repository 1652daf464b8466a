//! Library backend — catalog operations through the registry REST API
//! using a locally cached interactive session.
//!
//! Used when no per-request bearer token is available but the host has a
//! valid session file from an earlier interactive login. The session's
//! access token authenticates every call; an expired or revoked session
//! surfaces as an error naming re-authentication, never as empty results.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{
    BucketInfo, PackageContents, PackageEntry, PackageInfo, SearchHit, SearchResults, SearchScope,
};
use crate::auth::session::LocalSession;
use crate::{Error, Result};

/// REST transport backed by a local interactive session.
pub struct LibraryBackend {
    http: reqwest::Client,
}

impl LibraryBackend {
    /// Create with a bounded per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Search the catalog via the session's registry.
    pub async fn search(
        &self,
        session: &LocalSession,
        query: &str,
        scope: SearchScope,
        bucket: Option<&str>,
    ) -> Result<SearchResults> {
        let scope_str = match scope {
            SearchScope::Objects => "objects",
            SearchScope::Packages => "packages",
        };
        let mut request = self
            .http
            .get(endpoint(session, "api/search"))
            .query(&[("query", query), ("scope", scope_str)]);
        if let Some(bucket) = bucket {
            request = request.query(&[("bucket", bucket)]);
        }

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

        let wire: Wire = self.send(session, request).await?;
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

    /// List buckets visible to the session.
    pub async fn list_buckets(&self, session: &LocalSession) -> Result<Vec<BucketInfo>> {
        #[derive(Deserialize)]
        struct Wire {
            buckets: Vec<BucketInfo>,
        }
        let request = self.http.get(endpoint(session, "api/buckets"));
        let wire: Wire = self.send(session, request).await?;
        Ok(wire.buckets)
    }

    /// Browse a package's manifest.
    pub async fn browse_package(
        &self,
        session: &LocalSession,
        name: &str,
        registry: &str,
    ) -> Result<PackageContents> {
        let request = self
            .http
            .get(endpoint(session, &format!("api/packages/{name}")))
            .query(&[("registry", registry)]);

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

        let wire: Wire = self.send(session, request).await?;
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
        session: &LocalSession,
        registry: &str,
    ) -> Result<Vec<PackageInfo>> {
        #[derive(Deserialize)]
        struct Wire {
            packages: Vec<PackageInfo>,
        }
        let request = self
            .http
            .get(endpoint(session, "api/packages"))
            .query(&[("registry", registry)]);
        let wire: Wire = self.send(session, request).await?;
        Ok(wire.packages)
    }

    /// Execute a raw GraphQL document against the registry, authenticated
    /// with the session token instead of a per-request bearer.
    pub async fn execute_graphql(
        &self,
        session: &LocalSession,
        query: &str,
        variables: Value,
    ) -> Result<Value> {
        let request = self
            .http
            .post(endpoint(session, "graphql"))
            .json(&json!({ "query": query, "variables": variables }));
        let payload: Value = self.send(session, request).await?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(Error::upstream(200, message));
            }
        }
        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        session: &LocalSession,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        debug!(registry = %session.registry_url, "library request");
        let response = request
            .header(
                "authorization",
                format!("Bearer {}", session.access_token),
            )
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::AuthorizationError(
                "catalog session was rejected; run an interactive login to refresh it"
                    .to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }
}

fn endpoint(session: &LocalSession, suffix: &str) -> String {
    format!("{}/{suffix}", session.registry_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(registry: &str) -> LocalSession {
        LocalSession {
            catalog_url: "https://catalog.example.com".into(),
            registry_url: registry.to_string(),
            access_token: "session-tok".into(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn search_sends_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("query", "readme"))
            .and(header("authorization", "Bearer session-tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 1,
                "hits": [ { "bucket": "b1", "key": "docs/readme.md", "size": 120 } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = LibraryBackend::new(Duration::from_secs(5)).unwrap();
        let results = backend
            .search(&session(&server.uri()), "readme", SearchScope::Objects, None)
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].bucket, "b1");
    }

    #[tokio::test]
    async fn rejected_session_names_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = LibraryBackend::new(Duration::from_secs(5)).unwrap();
        let err = backend
            .list_buckets(&session(&server.uri()))
            .await
            .unwrap_err();
        match err {
            Error::AuthorizationError(msg) => assert!(msg.contains("interactive login")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn graphql_goes_through_registry_with_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer session-tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "me": { "name": "alice" } }
            })))
            .mount(&server)
            .await;

        let backend = LibraryBackend::new(Duration::from_secs(5)).unwrap();
        let data = backend
            .execute_graphql(
                &session(&server.uri()),
                "query { me { name } }",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert_eq!(data["me"]["name"], "alice");
    }

    #[tokio::test]
    async fn browse_package_parses_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/packages/team/data"))
            .and(query_param("registry", "s3://reg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": { "owner": "team" },
                "entries": [
                    { "logicalKey": "data.csv", "physicalKey": "s3://b/data.csv", "size": 42 }
                ]
            })))
            .mount(&server)
            .await;

        let backend = LibraryBackend::new(Duration::from_secs(5)).unwrap();
        let contents = backend
            .browse_package(&session(&server.uri()), "team/data", "s3://reg")
            .await
            .unwrap();
        assert_eq!(contents.entries.len(), 1);
        assert_eq!(contents.entries[0].logical_key, "data.csv");
        assert_eq!(contents.metadata["owner"], "team");
    }
}
