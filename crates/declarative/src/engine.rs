//! Reconciliation engine - validate, fetch, diff, apply, reload
//!
//! One run is a short synchronous sequence of at most three remote calls
//! over a single transport session:
//!
//! ```text
//! Idle -> Validated -> Fetched -> Diffed -> NoopDone
//!                                        -> Applied -> Reloaded
//! ```
//!
//! Any error moves the run to `Failed`. Validation happens before the first
//! remote call, so invalid input never reaches the appliance.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::diff::Diff;
use crate::error::{Error, Result};
use crate::request;
use crate::resource::{ResourceKind, ResourceSchema};
use crate::transport::{CallKind, Reload, RemoteRef, Transport};
use crate::types::{ActualState, DesiredState, FieldValue, Presence, RunOptions, RunState};
use crate::validate::validate;

/// Mutation a run will issue if it goes ahead
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "uuid")]
pub enum Action {
    /// Nothing to send
    Noop,
    /// Write the settings block, or an existing item by uuid
    Update(Option<String>),
    /// Add a new item
    Create,
    /// Delete an existing item by uuid
    Delete(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("none"),
            Self::Update(_) => f.write_str("update"),
            Self::Create => f.write_str("create"),
            Self::Delete(_) => f.write_str("delete"),
        }
    }
}

/// Outcome of the read half of a run: validated input, fetched state, diff
#[derive(Debug, Clone)]
pub struct Checked {
    desired: DesiredState,
    actual: Option<ActualState>,
    diff: Diff,
    action: Action,
}

impl Checked {
    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    /// Normalized remote state; `None` for an item that does not exist
    pub fn actual(&self) -> Option<&ActualState> {
        self.actual.as_ref()
    }

    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn is_changed(&self) -> bool {
        self.diff.changed
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Whether a mutation was issued
    pub changed: bool,
    pub diff: Diff,
    /// Terminal state the run ended in
    pub state: RunState,
    /// Reload failure after a successful apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

impl ReconcileReport {
    /// Caller-facing result: `{"changed": .., "diff": {"before": .., "after": ..}}`
    ///
    /// Empty values are stripped from both views.
    pub fn result(&self) -> Value {
        let diff = self.diff.without_empty();
        json!({
            "changed": self.changed,
            "diff": {
                "before": diff.before,
                "after": diff.after,
            }
        })
    }

    /// Whether the change was applied but the follow-up reload failed
    pub fn reload_failed(&self) -> bool {
        self.reload_error.is_some()
    }
}

/// Generic reconciliation engine for one resource schema
///
/// The engine borrows the transport for the duration of the run; owning and
/// closing the session is the caller's job (see [`reconcile`]).
pub struct Engine<'t, T: Transport + Reload + ?Sized> {
    schema: Arc<ResourceSchema>,
    transport: &'t T,
}

impl<'t, T: Transport + Reload + ?Sized> Engine<'t, T> {
    pub fn new(schema: Arc<ResourceSchema>, transport: &'t T) -> Self {
        Self { schema, transport }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Fetch and normalize a settings resource without validating anything
    pub fn search(&self) -> Result<Option<ActualState>> {
        if let Some(key) = self.schema.key_field() {
            return Err(Error::Environment(format!(
                "{} is an item resource; look it up by its '{key}' field",
                self.schema.name()
            )));
        }
        let raw = self.fetch()?;
        self.settings_state(&raw).map(Some)
    }

    /// Fetch and normalize the item whose key field equals `key`
    pub fn search_item(&self, key: &str) -> Result<Option<ActualState>> {
        if self.schema.key_field().is_none() {
            return Err(Error::Environment(format!(
                "{} is a settings resource and has no items",
                self.schema.name()
            )));
        }
        let raw = self.fetch()?;
        let found = self.find_item(&raw, &FieldValue::from(key))?;
        Ok(found.map(|(_, actual)| actual))
    }

    /// Validate, fetch and diff without mutating anything
    pub fn check(&self, desired: &DesiredState, opts: &RunOptions) -> Result<Checked> {
        self.check_inner(desired, opts)
            .inspect_err(|e| self.failed(e))
    }

    /// Issue the mutation a [`Checked`] run calls for, then reload if asked
    pub fn apply(&self, checked: Checked, opts: &RunOptions) -> Result<ReconcileReport> {
        self.apply_inner(checked, opts)
            .inspect_err(|e| self.failed(e))
    }

    /// Full run: [`Engine::check`] then [`Engine::apply`]
    pub fn run(&self, desired: &DesiredState, opts: &RunOptions) -> Result<ReconcileReport> {
        let checked = self.check(desired, opts)?;
        self.apply(checked, opts)
    }

    fn check_inner(&self, desired: &DesiredState, opts: &RunOptions) -> Result<Checked> {
        self.ensure_capabilities(opts)?;

        validate(desired, &self.schema, opts.state)?;
        self.transition(RunState::Idle, RunState::Validated);

        let raw = self.fetch()?;
        self.transition(RunState::Validated, RunState::Fetched);

        let exclude = self.schema.diff_excluded();
        let (actual, diff, action) = match self.schema.kind() {
            ResourceKind::Settings => {
                let actual = self.settings_state(&raw)?;
                let diff = Diff::compute(desired, &actual, &exclude);
                let action = if diff.changed {
                    Action::Update(None)
                } else {
                    Action::Noop
                };
                (Some(actual), diff, action)
            }
            ResourceKind::Item { key_field } => {
                let key = desired.get(key_field).cloned().unwrap_or(FieldValue::Null);
                match (self.find_item(&raw, &key)?, opts.state) {
                    (Some((uuid, actual)), Presence::Present) => {
                        let diff = Diff::compute(desired, &actual, &exclude);
                        let action = if diff.changed {
                            Action::Update(Some(uuid))
                        } else {
                            Action::Noop
                        };
                        (Some(actual), diff, action)
                    }
                    (Some((uuid, actual)), Presence::Absent) => {
                        let diff = Diff::removal(&actual, &exclude);
                        (Some(actual), diff, Action::Delete(uuid))
                    }
                    (None, Presence::Present) => {
                        (None, Diff::creation(desired, &exclude), Action::Create)
                    }
                    (None, Presence::Absent) => (None, Diff::unchanged(), Action::Noop),
                }
            }
        };
        self.transition(RunState::Fetched, RunState::Diffed);
        debug!(
            "{}: planned action {action}, changed fields {:?}",
            self.schema.name(),
            diff.changed_fields()
        );

        Ok(Checked {
            desired: desired.clone(),
            actual,
            diff,
            action,
        })
    }

    fn apply_inner(&self, checked: Checked, opts: &RunOptions) -> Result<ReconcileReport> {
        self.ensure_capabilities(opts)?;

        if opts.dry_run && checked.action != Action::Noop {
            info!(
                "{}: dry run, skipping {}",
                self.schema.name(),
                checked.action
            );
            return Ok(self.noop(checked.diff));
        }

        let (target, payload) = match &checked.action {
            Action::Noop => return Ok(self.noop(checked.diff)),
            Action::Update(uuid) => (
                self.schema.apply_ref(uuid.as_deref()),
                request::build(&checked.desired, &self.schema),
            ),
            Action::Create => (
                self.require(self.schema.add_ref(), "add")?,
                request::build(&checked.desired, &self.schema),
            ),
            Action::Delete(uuid) => (
                self.require(self.schema.delete_ref(uuid), "delete")?,
                Value::Object(Map::new()),
            ),
        };

        info!("{}: {} via {target}", self.schema.name(), checked.action);
        self.transport
            .apply(&target, &payload)
            .map_err(|e| Error::transport(CallKind::Apply, target.path(), e))?;
        self.transition(RunState::Diffed, RunState::Applied);

        let mut report = ReconcileReport {
            changed: true,
            diff: checked.diff,
            state: RunState::Applied,
            reload_error: None,
        };

        if opts.reload
            && let Some(target) = self.schema.reload_ref()
        {
            info!("{}: reloading via {target}", self.schema.name());
            match self.transport.reload(&target) {
                Ok(_) => {
                    self.transition(RunState::Applied, RunState::Reloaded);
                    report.state = RunState::Reloaded;
                }
                Err(e) => {
                    let error = Error::transport(CallKind::Reload, target.path(), e);
                    warn!(
                        "{}: change applied but reload failed: {error}",
                        self.schema.name()
                    );
                    report.reload_error = Some(error.to_string());
                }
            }
        }

        Ok(report)
    }

    fn noop(&self, diff: Diff) -> ReconcileReport {
        self.transition(RunState::Diffed, RunState::NoopDone);
        ReconcileReport {
            changed: false,
            diff,
            state: RunState::NoopDone,
            reload_error: None,
        }
    }

    /// Reject option combinations the schema cannot serve before any call
    fn ensure_capabilities(&self, opts: &RunOptions) -> Result<()> {
        if opts.reload && self.schema.reload_target().is_none() {
            return Err(Error::Environment(format!(
                "{} declares no reload command",
                self.schema.name()
            )));
        }
        if opts.state == Presence::Absent && self.schema.key_field().is_none() {
            return Err(Error::Environment(format!(
                "{} is a settings resource and cannot be removed",
                self.schema.name()
            )));
        }
        Ok(())
    }

    fn require(&self, target: Option<RemoteRef>, command: &str) -> Result<RemoteRef> {
        target.ok_or_else(|| {
            Error::Environment(format!(
                "{} declares no {command} command",
                self.schema.name()
            ))
        })
    }

    fn fetch(&self) -> Result<Value> {
        let target = self.schema.search_ref();
        debug!("{}: fetching {target}", self.schema.name());
        self.transport
            .fetch(&target)
            .map_err(|e| Error::transport(CallKind::Fetch, target.path(), e))
    }

    fn settings_state(&self, raw: &Value) -> Result<ActualState> {
        let inner = codec::unwrap_envelope(raw, &self.schema.search_path())?;
        codec::normalize(inner, &self.schema)
    }

    /// Find the item whose key field matches `key`
    ///
    /// Search responses carry either a `rows` array whose entries hold a
    /// `uuid`, or a mapping keyed by uuid.
    fn find_item(&self, raw: &Value, key: &FieldValue) -> Result<Option<(String, ActualState)>> {
        let Some(key_spec) = self.schema.key_field().and_then(|k| self.schema.field(k)) else {
            return Ok(None);
        };

        let path = self.schema.search_path();
        let rows: Vec<(String, &Map<String, Value>)> = match codec::locate(raw, &path)? {
            Value::Array(rows) => rows
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|row| {
                    row.get("uuid")
                        .and_then(Value::as_str)
                        .map(|uuid| (uuid.to_string(), row))
                })
                .collect(),
            Value::Object(entries) => entries
                .iter()
                .filter_map(|(uuid, row)| row.as_object().map(|row| (uuid.clone(), row)))
                .collect(),
            _ => {
                return Err(Error::MissingEnvelope {
                    path: path.join("."),
                });
            }
        };

        for (uuid, row) in rows {
            let matches = row
                .get(key_spec.remote_name())
                .or_else(|| row.get(&key_spec.name))
                .and_then(|value| codec::cast(key_spec, value, self.schema.encoding()).ok())
                .is_some_and(|value| !value.is_empty() && value.equivalent(key));
            if matches {
                debug!("{}: matched item {uuid}", self.schema.name());
                return codec::normalize(row, &self.schema).map(|actual| Some((uuid, actual)));
            }
        }
        Ok(None)
    }

    fn transition(&self, from: RunState, to: RunState) {
        debug!("{}: {from} -> {to}", self.schema.name());
    }

    fn failed(&self, error: &Error) {
        debug!(
            "{}: -> {} ({})",
            self.schema.name(),
            RunState::Failed,
            error.category()
        );
    }
}

/// Run one reconciliation over a session the function owns
///
/// The transport is closed afterwards whatever the outcome; a failure to
/// close is logged and does not mask the run's result.
pub fn reconcile<T: Transport + Reload>(
    schema: Arc<ResourceSchema>,
    transport: T,
    desired: &DesiredState,
    opts: &RunOptions,
) -> Result<ReconcileReport> {
    let name = schema.name().to_string();
    let result = Engine::new(schema, &transport).run(desired, opts);
    if let Err(e) = transport.close() {
        warn!("{name}: failed to close session: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FieldSpec;
    use crate::transport::{MockTransport, TransportError};
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<ResourceSchema> {
        Arc::new(
            ResourceSchema::builder("parent", "proxy", "settings")
                .field(FieldSpec::bool("enabled"))
                .field(FieldSpec::str("host"))
                .envelope(&["proxy", "parent"])
                .reload("service", "reconfigure")
                .build()
                .unwrap(),
        )
    }

    fn mock(enabled: &str) -> MockTransport {
        MockTransport::new().with_response(
            "proxy/settings/get",
            json!({"proxy": {"parent": {"enabled": enabled, "host": ""}}}),
        )
    }

    #[test]
    fn test_check_does_not_mutate() {
        let transport = mock("0");
        let engine = Engine::new(schema(), &transport);
        let desired = DesiredState::new().with("enabled", true);

        let checked = engine.check(&desired, &RunOptions::default()).unwrap();
        assert!(checked.is_changed());
        assert_eq!(checked.action(), &Action::Update(None));
        assert_eq!(transport.count(CallKind::Fetch), 1);
        assert_eq!(transport.count(CallKind::Apply), 0);
    }

    #[test]
    fn test_apply_after_check() {
        let transport = mock("0");
        let engine = Engine::new(schema(), &transport);
        let desired = DesiredState::new().with("enabled", true);
        let opts = RunOptions::default().reload(true);

        let checked = engine.check(&desired, &opts).unwrap();
        let report = engine.apply(checked, &opts).unwrap();

        assert!(report.changed);
        assert_eq!(report.state, RunState::Reloaded);
        assert_eq!(transport.calls()[1].path, "proxy/settings/set");
        assert_eq!(transport.calls()[2].path, "proxy/service/reconfigure");
    }

    #[test]
    fn test_search_settings() {
        let transport = mock("1");
        let engine = Engine::new(schema(), &transport);
        let actual = engine.search().unwrap().unwrap();
        assert_eq!(actual.get("enabled"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_search_item_on_settings_is_environment_error() {
        let transport = mock("1");
        let engine = Engine::new(schema(), &transport);
        let err = engine.search_item("x").unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
        assert_eq!(transport.calls().len(), 0);
    }

    #[test]
    fn test_absent_settings_rejected_before_calls() {
        let transport = mock("1");
        let engine = Engine::new(schema(), &transport);
        let opts = RunOptions::default().state(Presence::Absent);
        let err = engine.run(&DesiredState::new(), &opts).unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_fetch_failure_names_call() {
        let transport = mock("0");
        transport.fail(
            CallKind::Fetch,
            TransportError::Connection("refused".to_string()),
        );
        let engine = Engine::new(schema(), &transport);
        let err = engine
            .run(&DesiredState::new().with("enabled", true), &RunOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                call: CallKind::Fetch,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_envelope_is_normalization_error() {
        let transport = MockTransport::new().with_response("proxy/settings/get", json!({"proxy": {}}));
        let engine = Engine::new(schema(), &transport);
        let err = engine
            .run(&DesiredState::new().with("enabled", true), &RunOptions::default())
            .unwrap_err();
        assert!(err.category().is_defect());
    }

    #[test]
    fn test_report_result_strips_empty() {
        let report = ReconcileReport {
            changed: true,
            diff: Diff::compute(
                &DesiredState::new().with("enabled", true).with("host", ""),
                &[
                    ("enabled".to_string(), FieldValue::Bool(false)),
                    ("host".to_string(), FieldValue::from("")),
                ]
                .into_iter()
                .collect(),
                &[],
            ),
            state: RunState::Applied,
            reload_error: None,
        };
        assert_eq!(
            report.result(),
            json!({
                "changed": true,
                "diff": {"before": {"enabled": false}, "after": {"enabled": true}}
            })
        );
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Noop.to_string(), "none");
        assert_eq!(Action::Update(None).to_string(), "update");
        assert_eq!(Action::Create.to_string(), "create");
        assert_eq!(Action::Delete("u".into()).to_string(), "delete");
    }
}
