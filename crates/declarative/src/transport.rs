//! Transport and reload seams
//!
//! The engine never talks HTTP itself. It issues at most three calls per
//! run through these traits, which keeps it usable against any appliance
//! client and testable with [`MockTransport`]:
//!
//! ```
//! use declarative::{CallKind, MockTransport, RemoteRef, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.set_response("proxy/settings/get", json!({"proxy": {}}));
//!
//! let target = RemoteRef::new("proxy", "settings", "get");
//! let raw = mock.fetch(&target).unwrap();
//! assert_eq!(raw, json!({"proxy": {}}));
//! assert_eq!(mock.count(CallKind::Fetch), 1);
//! ```

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Address of one remote API call: `{module}/{controller}/{command}[/{uuid}]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RemoteRef {
    pub module: String,
    pub controller: String,
    pub command: String,
    pub uuid: Option<String>,
}

impl RemoteRef {
    pub fn new(
        module: impl Into<String>,
        controller: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            controller: controller.into(),
            command: command.into(),
            uuid: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Path relative to the API root
    pub fn path(&self) -> String {
        match &self.uuid {
            Some(uuid) => format!(
                "{}/{}/{}/{}",
                self.module, self.controller, self.command, uuid
            ),
            None => format!("{}/{}/{}", self.module, self.controller, self.command),
        }
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Which call of a run is being made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Fetch,
    Apply,
    Reload,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Apply => f.write_str("apply"),
            Self::Reload => f.write_str("reload"),
        }
    }
}

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the appliance.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Credentials were refused.
    #[error("authentication failed (HTTP {0})")]
    Auth(u16),

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The appliance answered but refused the change.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether the failure is a network error and the call may be retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Status { .. } | Self::Auth(_) | Self::Rejected(_) | Self::InvalidResponse(_) => {
                false
            }
        }
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Request/response access to the appliance's control API
///
/// Implementations own blocking I/O, timeouts and any retry policy. A
/// transport is one session: it is reused for every call of a run and
/// released with [`Transport::close`].
pub trait Transport: Send + Sync {
    /// Read state (the resource's "search" command)
    fn fetch(&self, target: &RemoteRef) -> TransportResult<Value>;

    /// Send an update payload
    fn apply(&self, target: &RemoteRef, payload: &Value) -> TransportResult<Value>;

    /// Release the session
    fn close(&self) -> TransportResult<()> {
        Ok(())
    }
}

/// Trigger a service reload after a configuration change
pub trait Reload: Send + Sync {
    fn reload(&self, target: &RemoteRef) -> TransportResult<Value>;
}

/// A call recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub path: String,
    pub payload: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, Value>,
    failures: HashMap<CallKind, TransportError>,
    calls: Vec<RecordedCall>,
    closed: usize,
}

/// In-memory transport for testing without an appliance
///
/// Fetch responses are configured per path; apply and reload answer with
/// the appliance's usual success bodies unless a response is configured for
/// the path. Every call is recorded. Clones share state, so a clone can be
/// handed to the engine while the original is kept for assertions.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the response for a path.
    pub fn set_response(&self, path: impl Into<String>, response: Value) {
        self.lock().responses.insert(path.into(), response);
    }

    /// Builder form of [`MockTransport::set_response`].
    #[must_use]
    pub fn with_response(self, path: impl Into<String>, response: Value) -> Self {
        self.set_response(path, response);
        self
    }

    /// Make every call of `kind` fail with `error`.
    pub fn fail(&self, kind: CallKind, error: TransportError) {
        self.lock().failures.insert(kind, error);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of one kind.
    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    /// Payload of the most recent apply call.
    pub fn last_payload(&self) -> Option<Value> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find(|c| c.kind == CallKind::Apply)
            .and_then(|c| c.payload.clone())
    }

    /// How many times the session was closed.
    pub fn close_count(&self) -> usize {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        kind: CallKind,
        target: &RemoteRef,
        payload: Option<&Value>,
        default: impl FnOnce() -> TransportResult<Value>,
    ) -> TransportResult<Value> {
        let path = target.path();
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            kind,
            path: path.clone(),
            payload: payload.cloned(),
        });
        if let Some(error) = state.failures.get(&kind) {
            return Err(error.clone());
        }
        match state.responses.get(&path) {
            Some(response) => Ok(response.clone()),
            None => default(),
        }
    }
}

impl Transport for MockTransport {
    fn fetch(&self, target: &RemoteRef) -> TransportResult<Value> {
        self.record(CallKind::Fetch, target, None, || {
            Err(TransportError::Status {
                status: 404,
                message: format!("no mock response for {target}"),
            })
        })
    }

    fn apply(&self, target: &RemoteRef, payload: &Value) -> TransportResult<Value> {
        self.record(CallKind::Apply, target, Some(payload), || {
            Ok(json!({"result": "saved"}))
        })
    }

    fn close(&self) -> TransportResult<()> {
        self.lock().closed += 1;
        Ok(())
    }
}

impl Reload for MockTransport {
    fn reload(&self, target: &RemoteRef) -> TransportResult<Value> {
        self.record(CallKind::Reload, target, None, || Ok(json!({"status": "ok"})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_ref_path() {
        let target = RemoteRef::new("proxy", "settings", "get");
        assert_eq!(target.path(), "proxy/settings/get");
        assert_eq!(
            target.with_uuid("1234").to_string(),
            "proxy/settings/get/1234"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TransportError::Connection("refused".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(20)).is_retryable());
        assert!(
            !TransportError::Status {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !TransportError::Status {
                status: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!TransportError::Auth(401).is_retryable());
        assert!(!TransportError::Rejected("invalid".into()).is_retryable());
    }

    #[test]
    fn test_mock_fetch_unconfigured_is_not_found() {
        let mock = MockTransport::new();
        let result = mock.fetch(&RemoteRef::new("a", "b", "c"));
        assert!(matches!(
            result,
            Err(TransportError::Status { status: 404, .. })
        ));
        assert_eq!(mock.count(CallKind::Fetch), 1);
    }

    #[test]
    fn test_mock_records_apply_payload() {
        let mock = MockTransport::new();
        let target = RemoteRef::new("proxy", "settings", "set");
        let response = mock.apply(&target, &json!({"a": "1"})).unwrap();

        assert_eq!(response, json!({"result": "saved"}));
        assert_eq!(mock.last_payload(), Some(json!({"a": "1"})));
        assert_eq!(mock.calls()[0].path, "proxy/settings/set");
    }

    #[test]
    fn test_mock_failures() {
        let mock = MockTransport::new();
        mock.fail(CallKind::Reload, TransportError::Auth(403));

        let result = mock.reload(&RemoteRef::new("proxy", "service", "reconfigure"));
        assert_eq!(result, Err(TransportError::Auth(403)));
        assert_eq!(mock.count(CallKind::Reload), 1);
    }

    #[test]
    fn test_mock_clones_share_state() {
        let mock = MockTransport::new();
        let clone = mock.clone();
        clone.close().unwrap();
        assert_eq!(mock.close_count(), 1);
    }
}
