//! Auth service selection and process-wide memoization.
//!
//! Precedence is evaluated exactly once: an explicit API key wins, then
//! JWT mode if enabled, then ambient IAM credentials. The selected service
//! is memoized for the process lifetime; [`reset`] exists for tests only.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::api_key::ApiKeyAuthService;
use super::iam::IamAuthService;
use super::jwt::JwtAuthService;
use super::sts::StsClient;
use super::{AuthMode, AuthService};
use crate::config::Config;
use crate::Result;

static SERVICE: Mutex<Option<Arc<dyn AuthService>>> = Mutex::const_new(None);

/// Which mode the configuration selects, by fixed precedence.
#[must_use]
pub fn select_mode(config: &Config) -> AuthMode {
    if config.auth.resolve_api_key().is_some() {
        AuthMode::ApiKey
    } else if config.auth.jwt.enabled {
        AuthMode::Jwt
    } else {
        AuthMode::Iam
    }
}

/// Return the process-wide auth service, constructing it on first call.
///
/// # Errors
///
/// IAM and API-key construction fail fast (no ambient credentials, key
/// rejected by the catalog) — fatal startup errors. JWT construction never
/// fails here beyond config validation; claim checks happen per request.
pub async fn auth_service(config: &Config) -> Result<Arc<dyn AuthService>> {
    let mut slot = SERVICE.lock().await;
    if let Some(service) = slot.as_ref() {
        return Ok(Arc::clone(service));
    }

    let mode = select_mode(config);
    info!(mode = %mode, "Selecting auth service");

    let service: Arc<dyn AuthService> = match mode {
        AuthMode::ApiKey => {
            let key = config
                .auth
                .resolve_api_key()
                .expect("precedence selected ApiKey, so a key is present");
            Arc::new(
                ApiKeyAuthService::login(
                    &config.catalog.registry_url,
                    &key,
                    config.timeouts.query,
                )
                .await?,
            )
        }
        AuthMode::Jwt => {
            let sts = StsClient::new(
                &config.catalog.sts_endpoint,
                &sts_region(&config.catalog.sts_endpoint),
                config.timeouts.assume_role,
            )?;
            Arc::new(JwtAuthService::new(sts))
        }
        AuthMode::Iam => Arc::new(IamAuthService::new()?),
    };

    *slot = Some(Arc::clone(&service));
    Ok(service)
}

/// Drop the memoized service. Test-only escape hatch.
pub async fn reset() {
    *SERVICE.lock().await = None;
}

/// Derive the signing region from an STS endpoint host
/// (`sts.us-west-2.amazonaws.com` → `us-west-2`; global endpoint →
/// `us-east-1`).
fn sts_region(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .and_then(|host| {
            let parts: Vec<&str> = host.split('.').collect();
            match parts.as_slice() {
                ["sts", region, "amazonaws", "com"] => Some((*region).to_string()),
                _ => None,
            }
        })
        .unwrap_or_else(|| "us-east-1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, JwtConfig};

    fn jwt_config() -> Config {
        Config {
            auth: AuthConfig {
                api_key: None,
                jwt: JwtConfig {
                    enabled: true,
                    secret: "s".into(),
                    ..Default::default()
                },
            },
            ..Default::default()
        }
    }

    #[test]
    fn api_key_takes_precedence_over_jwt() {
        let mut config = jwt_config();
        config.auth.api_key = Some("k".into());
        assert_eq!(select_mode(&config), AuthMode::ApiKey);
    }

    #[test]
    fn jwt_beats_iam_default() {
        assert_eq!(select_mode(&jwt_config()), AuthMode::Jwt);
    }

    #[test]
    fn iam_is_the_default_mode() {
        assert_eq!(select_mode(&Config::default()), AuthMode::Iam);
    }

    #[test]
    fn region_derived_from_regional_endpoint() {
        assert_eq!(sts_region("https://sts.eu-west-1.amazonaws.com"), "eu-west-1");
    }

    #[test]
    fn global_endpoint_falls_back_to_us_east_1() {
        assert_eq!(sts_region("https://sts.amazonaws.com"), "us-east-1");
    }

    #[tokio::test]
    async fn factory_memoizes_exactly_one_instance() {
        reset().await;
        let config = jwt_config();

        let a = auth_service(&config).await.unwrap();
        let b = auth_service(&config).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.mode(), AuthMode::Jwt);

        reset().await;
        let c = auth_service(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        reset().await;
    }
}
