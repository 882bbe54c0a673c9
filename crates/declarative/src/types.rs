//! Core types for declarative resource reconciliation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use crate::codec;
use crate::resource::ResourceSchema;
use crate::validate::{ValidationErrors, Violation};

/// Declared type of a resource field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Str,
    List,
}

impl FieldType {
    /// Short human-readable name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Str => "string",
            Self::List => "list",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed, canonical field value
///
/// Remote text encodings never leave the codec; everything past it works on
/// these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Unset (empty integer text, JSON null)
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Whether the value carries no content (`Null`, `""` or `[]`)
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Bool(_) | Self::Int(_) => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Type-aware equality used by the diff
    ///
    /// All empty values are equal to each other. Lists compare as unordered
    /// multisets since the appliance does not preserve selection order.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.is_empty() && other.is_empty() {
            return true;
        }
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                let mut a: Vec<&String> = a.iter().collect();
                let mut b: Vec<&String> = b.iter().collect();
                a.sort();
                b.sort();
                a == b
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<unset>"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<&[&str]> for FieldValue {
    fn from(value: &[&str]) -> Self {
        Self::List(value.iter().map(|s| (*s).to_string()).collect())
    }
}

/// Canonical field name to value, ordered by name
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Configuration the caller wants the resource to have
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DesiredState(FieldMap);

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field while constructing the state
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Parse caller input (a JSON object) against a schema
    ///
    /// Unknown keys and values that cannot represent the declared field type
    /// are reported together as validation errors.
    pub fn from_json(input: &Value, schema: &ResourceSchema) -> Result<Self, ValidationErrors> {
        let Some(object) = input.as_object() else {
            return Err(ValidationErrors::single(Violation::general(
                "desired state must be a mapping of field names to values",
            )));
        };

        let mut fields = FieldMap::new();
        let mut errors = ValidationErrors::default();

        for (name, raw) in object {
            let Some(spec) = schema.field(name) else {
                errors.push(Violation::field(
                    name,
                    format!("unknown field '{name}' for resource '{}'", schema.name()),
                ));
                continue;
            };
            match codec::cast(spec, raw, schema.encoding()) {
                Ok(value) => {
                    fields.insert(name.clone(), value);
                }
                Err(reason) => errors.push(Violation::field(
                    name,
                    format!("field '{name}' expects a {}: {reason}", spec.kind),
                )),
            }
        }

        if errors.is_empty() {
            Ok(Self(fields))
        } else {
            Err(errors)
        }
    }

    pub fn into_inner(self) -> FieldMap {
        self.0
    }
}

impl Deref for DesiredState {
    type Target = FieldMap;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<(String, FieldValue)> for DesiredState {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Configuration currently held by the appliance, after normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActualState(FieldMap);

impl ActualState {
    pub fn into_inner(self) -> FieldMap {
        self.0
    }
}

impl Deref for ActualState {
    type Target = FieldMap;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<(String, FieldValue)> for ActualState {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether an item resource should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// Options for a single reconciliation run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Compute and report the diff without mutating the appliance
    pub dry_run: bool,
    /// Issue the resource's reload command after a successful apply
    pub reload: bool,
    /// Target presence (only item resources may be `Absent`)
    pub state: Presence,
}

impl RunOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn state(mut self, state: Presence) -> Self {
        self.state = state;
        self
    }
}

/// Position of a run in the reconciliation state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Validated,
    Fetched,
    Diffed,
    /// Terminal: nothing was sent
    NoopDone,
    /// Terminal when no reload was requested (or the reload failed)
    Applied,
    /// Terminal: change applied and service reloaded
    Reloaded,
    /// Terminal: the run stopped on an error
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoopDone | Self::Applied | Self::Reloaded | Self::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validated => "validated",
            Self::Fetched => "fetched",
            Self::Diffed => "diffed",
            Self::NoopDone => "noop",
            Self::Applied => "applied",
            Self::Reloaded => "reloaded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
