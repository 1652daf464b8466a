//! Catalog Gateway Library
//!
//! Runtime authentication and catalog-backend routing for a multi-tenant
//! data-catalog service.
//!
//! # Features
//!
//! - **Isolated scopes**: task-local runtime context, no cross-request leakage
//! - **Three auth modes**: ambient IAM, catalog API key, per-request JWT
//! - **Deterministic routing**: GraphQL with a bearer token, library REST
//!   with a local session, never a silent fallback
//! - **Strict errors**: an auth failure is never shaped into empty results

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
