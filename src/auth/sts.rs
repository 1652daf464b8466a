//! STS role assumption over the HTTPS query API.
//!
//! Converts an identity claim (`role_arn` + session tags) into short-lived
//! scoped cloud credentials. The `AssumeRole` call is signed with SigV4
//! using the process's ambient credentials, runs under a bounded timeout,
//! and is never auto-retried — assumption failure surfaces as
//! [`Error::AuthorizationError`] to the caller.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use super::AwsCredentials;
use crate::{Error, Result};

const STS_API_VERSION: &str = "2011-06-15";
const ASSUME_ROLE_DURATION_SECS: u32 = 3600;

type HmacSha256 = Hmac<Sha256>;

/// STS client for `AssumeRole` calls.
///
/// The signing credentials are supplied per call: in JWT mode the process's
/// ambient credentials sign each tenant's assumption request.
pub struct StsClient {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    timeout: Duration,
}

impl StsClient {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the endpoint is not a valid URL.
    pub fn new(endpoint: &str, region: &str, timeout: Duration) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| Error::Config(format!("Invalid STS endpoint: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            endpoint,
            region: region.to_string(),
            timeout,
        })
    }

    /// Assume `role_arn` with `session_tags`, returning short-lived
    /// credentials.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthorizationError`] when STS rejects the assumption
    ///   (trust policy, tag restrictions, expired signer).
    /// - [`Error::Timeout`] when the bounded call exceeds its budget.
    pub async fn assume_role(
        &self,
        signer: &AwsCredentials,
        role_arn: &str,
        session_name: &str,
        session_tags: &HashMap<String, String>,
    ) -> Result<AwsCredentials> {
        let body = assume_role_body(role_arn, session_name, session_tags);
        let now = Utc::now();

        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| Error::Config("STS endpoint has no host".to_string()))?
            .to_string();

        let authorization = self.sign(signer, &host, &body, now);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        debug!(role_arn = %role_arn, tags = session_tags.len(), "Assuming role");

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .header("x-amz-date", amz_date)
            .header("authorization", authorization)
            .body(body);

        if let Some(ref token) = signer.session_token {
            request = request.header("x-amz-security-token", token.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: "assume_role".to_string(),
                    budget: self.timeout,
                }
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail = parse_sts_error(&text)
                .unwrap_or_else(|| format!("STS returned HTTP {}", status.as_u16()));
            warn!(role_arn = %role_arn, status = status.as_u16(), "Role assumption denied");
            return Err(Error::AuthorizationError(format!(
                "AssumeRole for {role_arn} failed: {detail}"
            )));
        }

        parse_assume_role_response(&text)
    }

    /// SigV4 signature for a query-API POST (empty canonical query string,
    /// all parameters in the form body).
    fn sign(&self, signer: &AwsCredentials, host: &str, body: &str, now: DateTime<Utc>) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
        // Canonical headers stay sorted by name. A temporary signer's
        // security token must itself be signed or STS rejects the request.
        let mut canonical_headers = format!(
            "content-type:application/x-www-form-urlencoded; charset=utf-8\nhost:{host}\nx-amz-date:{amz_date}\n"
        );
        let mut signed_headers = String::from("content-type;host;x-amz-date");
        if let Some(ref token) = signer.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
            signed_headers.push_str(";x-amz-security-token");
        }

        let canonical_request = format!(
            "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let scope = format!("{date}/{}/sts/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", signer.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"sts");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            signer.access_key_id
        )
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Build the form-encoded `AssumeRole` request body.
///
/// Session tags become `Tags.member.N.Key` / `Tags.member.N.Value` pairs,
/// sorted by key for a stable wire form.
fn assume_role_body(
    role_arn: &str,
    session_name: &str,
    session_tags: &HashMap<String, String>,
) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer
        .append_pair("Action", "AssumeRole")
        .append_pair("Version", STS_API_VERSION)
        .append_pair("RoleArn", role_arn)
        .append_pair("RoleSessionName", session_name)
        .append_pair("DurationSeconds", &ASSUME_ROLE_DURATION_SECS.to_string());

    let mut tags: Vec<(&String, &String)> = session_tags.iter().collect();
    tags.sort_by_key(|(k, _)| k.as_str());
    for (i, (key, value)) in tags.iter().enumerate() {
        let n = i + 1;
        serializer
            .append_pair(&format!("Tags.member.{n}.Key"), key)
            .append_pair(&format!("Tags.member.{n}.Value"), value);
    }

    serializer.finish()
}

/// Pull the text content of the first occurrence of each named element.
fn xml_text_fields(xml: &str, names: &[&str]) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut found: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    while let Ok(event) = reader.read_event() {
        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if names.contains(&name.as_str()) && !found.contains_key(&name) {
                    current = Some(name);
                }
            }
            Event::Text(ref t) => {
                if let Some(ref name) = current {
                    if let Ok(text) = t.unescape() {
                        found.insert(name.clone(), text.to_string());
                    }
                }
            }
            Event::End(_) => {
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    found
}

/// Parse `Credentials` out of an `AssumeRoleResponse` document.
fn parse_assume_role_response(xml: &str) -> Result<AwsCredentials> {
    let fields = xml_text_fields(
        xml,
        &["AccessKeyId", "SecretAccessKey", "SessionToken", "Expiration"],
    );

    let get = |name: &str| -> Result<String> {
        fields.get(name).cloned().ok_or_else(|| {
            Error::AuthorizationError(format!("STS response missing {name} element"))
        })
    };

    let expiration = fields
        .get("Expiration")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(AwsCredentials {
        access_key_id: get("AccessKeyId")?,
        secret_access_key: get("SecretAccessKey")?,
        session_token: Some(get("SessionToken")?),
        expiration,
    })
}

/// Extract `Code: Message` from an STS `ErrorResponse`, if present.
fn parse_sts_error(xml: &str) -> Option<String> {
    let fields = xml_text_fields(xml, &["Code", "Message"]);
    match (fields.get("Code"), fields.get("Message")) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (Some(code), None) => Some(code.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSUME_ROLE_OK: &str = r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleResult>
    <Credentials>
      <AccessKeyId>ASIAEXAMPLE</AccessKeyId>
      <SecretAccessKey>secret/key</SecretAccessKey>
      <SessionToken>session-token-value</SessionToken>
      <Expiration>2030-01-01T00:00:00Z</Expiration>
    </Credentials>
  </AssumeRoleResult>
</AssumeRoleResponse>"#;

    const ACCESS_DENIED: &str = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>Not authorized to perform sts:AssumeRole</Message>
  </Error>
</ErrorResponse>"#;

    #[test]
    fn parses_credentials_from_assume_role_response() {
        let creds = parse_assume_role_response(ASSUME_ROLE_OK).unwrap();
        assert_eq!(creds.access_key_id, "ASIAEXAMPLE");
        assert_eq!(creds.secret_access_key, "secret/key");
        assert_eq!(creds.session_token.as_deref(), Some("session-token-value"));
        assert!(creds.expiration.is_some());
    }

    #[test]
    fn missing_credentials_element_is_an_authorization_error() {
        let err = parse_assume_role_response("<AssumeRoleResponse/>").unwrap_err();
        assert!(matches!(err, Error::AuthorizationError(_)));
    }

    #[test]
    fn parses_sts_error_code_and_message() {
        let detail = parse_sts_error(ACCESS_DENIED).unwrap();
        assert_eq!(detail, "AccessDenied: Not authorized to perform sts:AssumeRole");
    }

    #[test]
    fn body_contains_sorted_tag_members() {
        let mut tags = HashMap::new();
        tags.insert("team".to_string(), "data".to_string());
        tags.insert("env".to_string(), "prod".to_string());

        let body = assume_role_body("arn:aws:iam::123:role/r1", "catalog-gateway", &tags);

        assert!(body.contains("Action=AssumeRole"));
        assert!(body.contains("RoleSessionName=catalog-gateway"));
        // Sorted by key: env before team
        assert!(body.contains("Tags.member.1.Key=env"));
        assert!(body.contains("Tags.member.1.Value=prod"));
        assert!(body.contains("Tags.member.2.Key=team"));
    }

    #[test]
    fn role_arn_is_form_encoded() {
        let body = assume_role_body("arn:aws:iam::123:role/r1", "s", &HashMap::new());
        assert!(body.contains("RoleArn=arn%3Aaws%3Aiam%3A%3A123%3Arole%2Fr1"));
    }

    fn test_signer() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            expiration: None,
        }
    }

    #[test]
    fn session_token_is_signed_when_present() {
        let client =
            StsClient::new("https://sts.amazonaws.com", "us-east-1", Duration::from_secs(5))
                .unwrap();

        let mut signer = test_signer();
        signer.session_token = Some("ambient-session".into());
        let with_token = client.sign(&signer, "sts.amazonaws.com", "Action=AssumeRole", Utc::now());
        assert!(with_token
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));

        let without = client.sign(
            &test_signer(),
            "sts.amazonaws.com",
            "Action=AssumeRole",
            Utc::now(),
        );
        assert!(without.contains("SignedHeaders=content-type;host;x-amz-date,"));
    }

    #[tokio::test]
    async fn assume_role_returns_scoped_credentials() {
        use wiremock::matchers::{body_string_contains, header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Action=AssumeRole"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ASSUME_ROLE_OK))
            .mount(&server)
            .await;

        let client =
            StsClient::new(&server.uri(), "us-east-1", Duration::from_secs(5)).unwrap();
        let creds = client
            .assume_role(
                &test_signer(),
                "arn:aws:iam::123:role/r1",
                "alice",
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(creds.access_key_id, "ASIAEXAMPLE");
        assert!(creds.session_token.is_some());
    }

    #[tokio::test]
    async fn slow_sts_endpoint_surfaces_a_timeout() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string(ASSUME_ROLE_OK),
            )
            .mount(&server)
            .await;

        let client =
            StsClient::new(&server.uri(), "us-east-1", Duration::from_millis(200)).unwrap();
        let err = client
            .assume_role(
                &test_signer(),
                "arn:aws:iam::123:role/r1",
                "alice",
                &HashMap::new(),
            )
            .await
            .unwrap_err();

        match err {
            Error::Timeout { operation, .. } => assert_eq!(operation, "assume_role"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn denied_assumption_is_an_authorization_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string(ACCESS_DENIED))
            .mount(&server)
            .await;

        let client =
            StsClient::new(&server.uri(), "us-east-1", Duration::from_secs(5)).unwrap();
        let err = client
            .assume_role(
                &test_signer(),
                "arn:aws:iam::123:role/untrusted",
                "alice",
                &HashMap::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthorizationError(_)));
        assert!(err.to_string().contains("AccessDenied"));
    }
}
