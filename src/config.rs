//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Catalog endpoint defaults (IAM/desktop mode)
    pub catalog: CatalogConfig,
    /// Operation timeout budgets
    pub timeouts: TimeoutsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Authentication configuration
///
/// Mode precedence is evaluated once at startup: an explicit API key wins,
/// then JWT mode if enabled, then ambient IAM credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Explicit catalog API key (supports `env:VAR_NAME` indirection)
    #[serde(default)]
    pub api_key: Option<String>,

    /// JWT request-token verification settings
    pub jwt: JwtConfig,
}

impl AuthConfig {
    /// Resolve the API key, expanding `env:VAR_NAME` references.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| resolve_secret(key))
    }
}

/// JWT verification configuration for HTTP mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Enable JWT mode (stateless multi-tenant HTTP service)
    pub enabled: bool,
    /// HS256 shared signing secret (supports `env:VAR_NAME` indirection)
    pub secret: String,
    /// Required `iss` claim
    pub issuer: String,
    /// Required `aud` claim
    pub audience: String,
    /// Reject tokens issued more than this long ago (replay bound)
    #[serde(with = "humantime_serde")]
    pub max_token_age: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            issuer: "catalog-gateway".to_string(),
            audience: "catalog".to_string(),
            max_token_age: Duration::from_secs(3600),
        }
    }
}

impl JwtConfig {
    /// Resolve the signing secret, expanding `env:VAR_NAME` references.
    #[must_use]
    pub fn resolve_secret(&self) -> String {
        resolve_secret(&self.secret)
    }
}

/// Catalog endpoint defaults used when no per-request claims supply them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog UI URL (IAM mode default)
    pub catalog_url: String,
    /// Registry API URL (IAM mode default)
    pub registry_url: String,
    /// STS endpoint for role assumption
    pub sts_endpoint: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            registry_url: String::new(),
            sts_endpoint: "https://sts.amazonaws.com".to_string(),
        }
    }
}

/// Per-operation timeout budgets.
///
/// Permission-discovery operations (bucket listing) legitimately run much
/// longer than single-object fetches; a uniform short budget produces
/// spurious failures on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Role assumption (STS AssumeRole)
    #[serde(with = "humantime_serde")]
    pub assume_role: Duration,
    /// Single-object operations: search, browse, GraphQL queries
    #[serde(with = "humantime_serde")]
    pub query: Duration,
    /// Permission-discovery operations: bucket listing
    #[serde(with = "humantime_serde")]
    pub discovery: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            assume_role: Duration::from_secs(15),
            query: Duration::from_secs(10),
            discovery: Duration::from_secs(45),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (CATALOG_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("CATALOG_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before secret resolution)
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}

/// Expand `env:VAR_NAME` references in secret-bearing config values.
/// Unresolvable references fall back to the literal value.
fn resolve_secret(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "1h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
