//! HTTP server: JWT-verified multi-tenant entry point.

pub mod middleware;
pub mod router;

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use crate::auth::AuthMode;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::{Error, Result};

use middleware::JwtVerifier;
use router::{AppState, create_router};

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration selects a non-JWT auth mode, the
/// JWT verifier or catalog service cannot be built, the listen address
/// cannot be bound, or the server fails.
pub async fn run(config: &Config) -> Result<()> {
    // The multi-tenant server must resolve credentials from each request's
    // verified claims. IAM and API-key services hold a single fixed
    // identity and would serve every tenant from it, so they never back
    // the HTTP entry point.
    let mode = crate::auth::factory::select_mode(config);
    if mode != AuthMode::Jwt {
        return Err(Error::Config(format!(
            "the HTTP server requires JWT auth, but the configuration selects {mode} mode; \
             set auth.jwt.enabled = true and auth.jwt.secret"
        )));
    }

    let verifier = Arc::new(JwtVerifier::from_config(&config.auth.jwt)?);
    let auth = crate::auth::factory::auth_service(config).await?;
    let catalog = Arc::new(CatalogService::new(auth, config.timeouts.clone())?);

    let state = Arc::new(AppState { catalog, verifier });
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind {addr}: {e}")))?;

    info!(addr = %addr, "Catalog gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
