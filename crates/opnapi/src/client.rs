//! HTTP client for the OPNsense control API.
//!
//! Calls go to `https://{firewall}:{port}/api/{module}/{controller}/{command}`
//! with HTTP basic auth (API key and secret). Reads use `GET`; updates and
//! reloads use `POST` with a JSON body.
//!
//! The appliance answers most rejected changes with `200 OK`, so response
//! bodies are inspected as well: `"result": "failed"` or a non-empty
//! `validations` object on an update, or a reload `status` other than `ok`,
//! become [`TransportError::Rejected`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use declarative::{Reload, RemoteRef, Transport, TransportError, TransportResult};
use serde_json::{Value, json};
use std::time::Duration;
use ureq::http::Response;
use ureq::tls::TlsConfig;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::retry::{LogCallback, RetryConfig, with_retry};

const USER_AGENT: &str = concat!("opnrecon/", env!("CARGO_PKG_VERSION"));

/// Longest error body excerpt carried in a status error.
const MAX_ERROR_BODY: usize = 200;

/// Blocking OPNsense API client.
///
/// One client is one session: the underlying agent pools connections
/// across the calls of a run.
///
/// # Example
///
/// ```no_run
/// use opnapi::{ConnectionConfig, OpnSenseClient};
/// use declarative::{RemoteRef, Transport};
///
/// let config = ConnectionConfig {
///     firewall: "192.0.2.1".to_string(),
///     api_key: Some("key".to_string()),
///     api_secret: Some("secret".to_string()),
///     ..Default::default()
/// };
/// let client = OpnSenseClient::new(&config).unwrap();
/// let settings = client.fetch(&RemoteRef::new("proxy", "settings", "get")).unwrap();
/// println!("{settings}");
/// ```
pub struct OpnSenseClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
    ssl_verify: bool,
    timeout: Duration,
    retry: RetryConfig,
}

impl OpnSenseClient {
    /// Create a client from connection settings.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let credentials = config.credentials()?;
        let token = STANDARD.encode(format!("{}:{}", credentials.key, credentials.secret));

        if !config.ssl_verify {
            log::warn!(
                "TLS certificate verification is disabled for {}",
                config.firewall
            );
        }

        let timeout = config.timeout();
        Ok(Self {
            agent: build_agent(timeout, config.ssl_verify),
            base_url: config.base_url(),
            auth_header: format!("Basic {token}"),
            ssl_verify: config.ssl_verify,
            timeout,
            retry: RetryConfig::with_retries(config.api_retries),
        })
    }

    /// Use a different per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if timeout != self.timeout {
            self.agent = build_agent(timeout, self.ssl_verify);
            self.timeout = timeout;
        }
        self
    }

    /// Use a different retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full URL of a remote call.
    pub fn url(&self, target: &RemoteRef) -> String {
        format!("{}/{}", self.base_url, target.path())
    }

    fn get(&self, target: &RemoteRef) -> TransportResult<Value> {
        let url = self.url(target);
        log::debug!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.auth_header.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| self.map_error(e))?;
        read_json(response)
    }

    fn post(&self, target: &RemoteRef, payload: &Value) -> TransportResult<Value> {
        let url = self.url(target);
        log::debug!("POST {url}");
        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.auth_header.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send_json(payload)
            .map_err(|e| self.map_error(e))?;
        read_json(response)
    }

    fn map_error(&self, err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::StatusCode(code @ (401 | 403)) => TransportError::Auth(code),
            ureq::Error::StatusCode(code) => TransportError::Status {
                status: code,
                message: format!("HTTP {code}"),
            },
            ureq::Error::Timeout(_) => TransportError::Timeout(self.timeout),
            other => TransportError::Connection(other.to_string()),
        }
    }
}

impl Transport for OpnSenseClient {
    fn fetch(&self, target: &RemoteRef) -> TransportResult<Value> {
        with_retry(&self.retry, Some(&LogCallback), || self.get(target))
    }

    fn apply(&self, target: &RemoteRef, payload: &Value) -> TransportResult<Value> {
        let response = with_retry(&self.retry, Some(&LogCallback), || {
            self.post(target, payload)
        })?;
        check_apply_response(&response)?;
        Ok(response)
    }

    fn close(&self) -> TransportResult<()> {
        log::debug!("Closing session to {}", self.base_url);
        Ok(())
    }
}

impl Reload for OpnSenseClient {
    fn reload(&self, target: &RemoteRef) -> TransportResult<Value> {
        let response = with_retry(&self.retry, Some(&LogCallback), || {
            self.post(target, &json!({}))
        })?;
        check_reload_response(&response)?;
        Ok(response)
    }
}

fn build_agent(timeout: Duration, ssl_verify: bool) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .tls_config(
            TlsConfig::builder()
                .disable_verification(!ssl_verify)
                .build(),
        )
        .build();
    ureq::Agent::new_with_config(config)
}

fn read_json(mut response: Response<ureq::Body>) -> TransportResult<Value> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

    match status {
        200..=299 => {}
        401 | 403 => return Err(TransportError::Auth(status)),
        _ => {
            return Err(TransportError::Status {
                status,
                message: excerpt(&body),
            });
        }
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// Detect a refused update in a `200 OK` body
pub(crate) fn check_apply_response(body: &Value) -> TransportResult<()> {
    if let Some(validations) = body.get("validations").and_then(Value::as_object)
        && !validations.is_empty()
    {
        let messages: Vec<String> = validations
            .iter()
            .map(|(field, message)| format!("{field}: {}", validation_text(message)))
            .collect();
        return Err(TransportError::Rejected(messages.join("; ")));
    }

    if body
        .get("result")
        .and_then(Value::as_str)
        .is_some_and(|result| result.eq_ignore_ascii_case("failed"))
    {
        return Err(TransportError::Rejected(
            "appliance reported result 'failed'".to_string(),
        ));
    }
    Ok(())
}

/// Detect a failed service reload
pub(crate) fn check_reload_response(body: &Value) -> TransportResult<()> {
    match body.get("status").and_then(Value::as_str) {
        Some(status) if !status.trim().eq_ignore_ascii_case("ok") => Err(
            TransportError::Rejected(format!("reload status '{}'", status.trim())),
        ),
        _ => Ok(()),
    }
}

fn validation_text(message: &Value) -> String {
    match message {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            firewall: "192.0.2.1".to_string(),
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_construction() {
        let client = OpnSenseClient::new(&config()).unwrap();
        let target = RemoteRef::new("proxy", "settings", "get");
        assert_eq!(
            client.url(&target),
            "https://192.0.2.1:443/api/proxy/settings/get"
        );
        assert_eq!(
            client.url(&RemoteRef::new("ipsec", "key_pairs", "setItem").with_uuid("u-1")),
            "https://192.0.2.1:443/api/ipsec/key_pairs/setItem/u-1"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let client = OpnSenseClient::new(&config()).unwrap();
        assert_eq!(client.auth_header, "Basic a2V5OnNlY3JldA==");
    }

    #[test]
    fn test_missing_credentials_fail_early() {
        let config = ConnectionConfig {
            firewall: "192.0.2.1".to_string(),
            ..Default::default()
        };
        assert!(OpnSenseClient::new(&config).is_err());
    }

    #[test]
    fn test_with_timeout() {
        let client = OpnSenseClient::new(&config())
            .unwrap()
            .with_timeout(Duration::from_secs(60));
        assert_eq!(client.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_saved_response_accepted() {
        assert!(check_apply_response(&json!({"result": "saved"})).is_ok());
        assert!(check_apply_response(&json!({"result": "saved", "validations": {}})).is_ok());
    }

    #[test]
    fn test_validations_rejected() {
        let body = json!({
            "result": "failed",
            "validations": {
                "general.parentproxy.host": "Please specify a valid IP address.",
                "general.parentproxy.port": ["Out of range.", "Required."]
            }
        });
        let err = check_apply_response(&body).unwrap_err();
        match err {
            TransportError::Rejected(message) => {
                assert!(message.contains("general.parentproxy.host: Please specify"));
                assert!(message.contains("Out of range., Required."));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_result_rejected() {
        let err = check_apply_response(&json!({"result": "failed"})).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reload_status() {
        assert!(check_reload_response(&json!({"status": "ok"})).is_ok());
        assert!(check_reload_response(&json!({"status": "OK\n\n"})).is_ok());
        assert!(check_reload_response(&json!({})).is_ok());

        let err = check_reload_response(&json!({"status": "failed"})).unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected("reload status 'failed'".to_string())
        );
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), MAX_ERROR_BODY + 3);
        assert_eq!(excerpt("  short \n"), "short");
    }
}
