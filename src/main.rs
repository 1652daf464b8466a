//! Catalog Gateway - authenticated routing for data-catalog operations

use std::process::ExitCode;

use clap::Parser;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use catalog_gateway::{
    auth::jwt::RequestClaims,
    cli::{Cli, Command},
    config::Config,
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Token {
            sub,
            catalog_token,
            catalog_url,
            registry_url,
            role_arn,
            ttl,
        }) => mint_token(
            &config,
            &sub,
            &catalog_token,
            catalog_url,
            registry_url,
            role_arn,
            ttl,
        ),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        jwt = config.auth.jwt.enabled,
        "Starting catalog gateway"
    );

    if let Err(e) = server::run(&config).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

/// Mint a development JWT signed with the configured secret.
///
/// A catalog bearer token is mandatory: a request token without one
/// authenticates the caller but cannot reach any catalog backend.
fn mint_token(
    config: &Config,
    sub: &str,
    catalog_token: &str,
    catalog_url: Option<String>,
    registry_url: Option<String>,
    role_arn: Option<String>,
    ttl: u64,
) -> ExitCode {
    let secret = config.auth.jwt.resolve_secret();
    if secret.is_empty() {
        eprintln!("auth.jwt.secret must be configured to mint tokens");
        return ExitCode::FAILURE;
    }

    let now = match u64::try_from(chrono::Utc::now().timestamp()) {
        Ok(now) => now,
        Err(e) => {
            eprintln!("System clock is before the Unix epoch: {e}");
            return ExitCode::FAILURE;
        }
    };

    let claims = RequestClaims {
        iss: config.auth.jwt.issuer.clone(),
        aud: config.auth.jwt.audience.clone(),
        iat: now,
        exp: now + ttl,
        sub: sub.to_string(),
        role_arn,
        session_tags: std::collections::HashMap::new(),
        catalog_token: Some(catalog_token.to_string()),
        catalog_url: catalog_url.or_else(|| non_empty(&config.catalog.catalog_url)),
        registry_url: registry_url.or_else(|| non_empty(&config.catalog.registry_url)),
    };

    match encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    ) {
        Ok(token) => {
            println!("{token}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to sign token: {e}");
            ExitCode::FAILURE
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
