//! Runtime context — per-scope isolated auth and environment state.
//!
//! Every unit of work runs inside a *scope*: the whole process lifetime in
//! desktop mode, one inbound request in HTTP mode. A scope carries the
//! execution environment, the caller's authentication state, and free-form
//! metadata. Scopes are isolated: two concurrent request tasks can never
//! observe each other's auth state or metadata.
//!
//! # Task-local propagation
//!
//! The current scope is stored in a `tokio::task_local!` slot. Call
//! [`scope`] to run a future inside a fresh scope, and the `current_*`
//! accessors to read it from anywhere in the call stack. Reading outside
//! an active scope returns documented defaults
//! ([`Environment::Unknown`] / `None`) rather than failing, so trivial
//! callers need not open a scope; catalog operations still treat a missing
//! auth state as a hard error.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_gateway::context::{self, Environment, RuntimeContextState};
//!
//! let state = RuntimeContextState::new(Environment::Http, Some(auth));
//! context::scope(state, async {
//!     assert_eq!(context::current_environment(), Environment::Http);
//!     // ... handle the request ...
//! }).await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution environment a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Single-user long-lived local process
    Desktop,
    /// Stateless multi-tenant HTTP service
    Http,
    /// No scope active (read outside any scope)
    Unknown,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Desktop => "desktop",
            Self::Http => "http",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Authentication state owned by a single scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthState {
    /// Authentication scheme, e.g. `iam`, `jwt`, `api_key`
    pub scheme: String,
    /// Raw access token, when one was presented
    pub access_token: Option<String>,
    /// Verified claims, copied verbatim from the bearer token
    #[serde(default)]
    pub claims: HashMap<String, Value>,
    /// Scheme-specific extras
    #[serde(default)]
    pub extras: HashMap<String, Value>,
}

impl AuthState {
    /// Create an auth state for `scheme` with no token or claims.
    #[must_use]
    pub fn new(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            access_token: None,
            claims: HashMap::new(),
            extras: HashMap::new(),
        }
    }

    /// Read a string-valued claim.
    #[must_use]
    pub fn claim_str(&self, key: &str) -> Option<&str> {
        self.claims.get(key).and_then(Value::as_str)
    }
}

/// Immutable snapshot of a scope's state.
///
/// Metadata updates replace the snapshot inside the owning scope only;
/// snapshots handed to other tasks are never mutated in place.
#[derive(Debug, Clone)]
pub struct RuntimeContextState {
    /// Which execution environment this scope belongs to
    pub environment: Environment,
    /// Caller authentication, if any
    pub auth: Option<AuthState>,
    /// Free-form scope metadata
    pub metadata: HashMap<String, Value>,
}

impl RuntimeContextState {
    /// Create a state with empty metadata.
    #[must_use]
    pub fn new(environment: Environment, auth: Option<AuthState>) -> Self {
        Self {
            environment,
            auth,
            metadata: HashMap::new(),
        }
    }
}

/// Scope cell: snapshot behind a lock so `update_metadata` can swap it
/// without being visible to any other task (the cell itself is task-local).
type ScopeCell = Arc<RwLock<RuntimeContextState>>;

tokio::task_local! {
    static SCOPE: ScopeCell;
}

/// Run `future` inside a fresh isolated scope holding `state`.
///
/// The scope is released when the future completes on any path, including
/// panics — the task-local slot unwinds with the future.
pub async fn scope<F, T>(state: RuntimeContextState, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    SCOPE.scope(Arc::new(RwLock::new(state)), future).await
}

/// Environment of the current scope, or [`Environment::Unknown`] outside one.
#[must_use]
pub fn current_environment() -> Environment {
    SCOPE
        .try_with(|cell| cell.read().environment)
        .unwrap_or(Environment::Unknown)
}

/// Auth state of the current scope, or `None` outside one.
#[must_use]
pub fn current_auth() -> Option<AuthState> {
    SCOPE.try_with(|cell| cell.read().auth.clone()).ok().flatten()
}

/// Snapshot of the current scope's metadata.
#[must_use]
pub fn current_metadata() -> HashMap<String, Value> {
    SCOPE
        .try_with(|cell| cell.read().metadata.clone())
        .unwrap_or_default()
}

/// Merge a metadata entry into the current scope.
///
/// Returns `false` when called outside an active scope (the write has
/// nowhere to go and is dropped).
pub fn update_metadata(key: &str, value: Value) -> bool {
    SCOPE
        .try_with(|cell| {
            cell.write().metadata.insert(key.to_string(), value);
        })
        .is_ok()
}
