//! JWT authentication middleware.
//!
//! Verifies the bearer token on every request (signature, issuer,
//! audience, expiry, issued-at age bound), then opens a fresh runtime
//! scope carrying the verified claims around the inner handler. The
//! handler and everything below it read authentication exclusively from
//! the scope, never from raw headers.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::jwt::RequestClaims;
use crate::config::JwtConfig;
use crate::context::{self, Environment, RuntimeContextState};
use crate::{Error, Result};

/// Paths that never require a token.
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Clock skew tolerance for `exp`/`iat` checks.
const LEEWAY_SECS: u64 = 60;

/// Verifier built once at startup from the JWT config.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    max_token_age_secs: u64,
}

impl JwtVerifier {
    /// Build a verifier from config.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when no signing secret is configured.
    pub fn from_config(config: &JwtConfig) -> Result<Self> {
        let secret = config.resolve_secret();
        if secret.is_empty() {
            return Err(Error::Config(
                "auth.jwt.secret is not configured".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.leeway = LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            max_token_age_secs: config.max_token_age.as_secs(),
        })
    }

    /// Verify a raw token and return its claims.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidToken`] on any verification failure, including a
    /// token older than the configured age bound.
    pub fn verify(&self, token: &str) -> Result<RequestClaims> {
        let data = decode::<RequestClaims>(token, &self.key, &self.validation)
            .map_err(|e| Error::InvalidToken(e.to_string()))?;

        // Expiry alone allows long-lived tokens to be replayed; bound the
        // issued-at age as well.
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        let age_bound = data
            .claims
            .iat
            .saturating_add(self.max_token_age_secs)
            .saturating_add(LEEWAY_SECS);
        if age_bound < now {
            return Err(Error::InvalidToken(format!(
                "token issued more than {}s ago",
                self.max_token_age_secs
            )));
        }

        Ok(data.claims)
    }
}

/// Axum middleware: verify the bearer token and run the inner handler
/// inside a scope carrying the verified claims.
pub async fn jwt_middleware(
    State(verifier): State<Arc<JwtVerifier>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if PUBLIC_PATHS.contains(&path) {
        debug!(path = %path, "public path, skipping auth");
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        });

    let Some(token) = token else {
        warn!(path = %path, "missing Authorization header");
        return rejection(
            &Error::MissingCredentials,
            "Missing Authorization header. Use: Authorization: Bearer <token>",
        );
    };

    let claims = match verifier.verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(path = %path, error = %err, "token rejected");
            return rejection(&err, &err.to_string());
        }
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    debug!(sub = %claims.sub, path = %path, request_id = %request_id, "authenticated request");

    let mut state = RuntimeContextState::new(Environment::Http, Some(claims.to_auth_state(token)));
    state
        .metadata
        .insert("request_id".to_string(), json!(request_id));
    context::scope(state, next.run(request)).await
}

/// 401 rejection carrying the error kind and remediation.
fn rejection(err: &Error, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({
            "error": {
                "kind": err.kind(),
                "message": message,
                "remediation": err.remediation(),
            }
        })),
    )
        .into_response()
}
