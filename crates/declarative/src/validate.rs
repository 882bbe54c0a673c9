//! Desired-state validation
//!
//! Runs before any remote call. All violations are collected so the caller
//! can fix every problem in one go.

use serde::Serialize;
use std::fmt;

use crate::resource::{Condition, ResourceSchema};
use crate::types::{DesiredState, FieldType, FieldValue, Presence};

/// One violated constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Field the violation concerns, if it concerns a single one
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every violation found in a desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    pub fn single(violation: Violation) -> Self {
        Self(vec![violation])
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    /// Whether any violation carries `needle` in its message
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|v| v.message.contains(needle))
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|v| v.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a desired state against its schema
///
/// Order: required fields, per-field range and pattern checks, the schema's
/// conditional rules, then semantic formats. Absent item resources only
/// need their key field.
pub fn validate(
    desired: &DesiredState,
    schema: &ResourceSchema,
    presence: Presence,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if presence == Presence::Absent {
        if let Some(key) = schema.key_field() {
            check_required(desired, key, &mut errors);
        }
        return errors.into_result();
    }

    for spec in schema.fields().iter().filter(|f| f.required) {
        check_required(desired, &spec.name, &mut errors);
    }
    if let Some(key) = schema.key_field()
        && !schema.field(key).is_some_and(|f| f.required)
    {
        check_required(desired, key, &mut errors);
    }

    for (name, value) in desired.iter() {
        let Some(spec) = schema.field(name) else {
            errors.push(Violation::field(name, format!("unknown field '{name}'")));
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if !has_kind(value, spec.kind) {
            errors.push(Violation::field(
                name,
                format!("value of field '{name}' must be of type {}, got {value}", spec.kind),
            ));
            continue;
        }

        if let FieldValue::Int(number) = value {
            if let Some(min) = spec.min
                && *number < min
            {
                errors.push(Violation::field(
                    name,
                    format!("value of field '{name}' must be >= {min}, got {number}"),
                ));
            }
            if let Some(max) = spec.max
                && *number > max
            {
                errors.push(Violation::field(
                    name,
                    format!("value of field '{name}' must be <= {max}, got {number}"),
                ));
            }
        }

        if let Some(pattern) = schema.pattern_for(name) {
            let matched = match value {
                FieldValue::List(items) => items.iter().all(|item| pattern.is_match(item)),
                other => pattern.is_match(&text_of(other)),
            };
            if !matched {
                errors.push(Violation::field(
                    name,
                    format!("value of field '{name}' does not match the expected format"),
                ));
            }
        }
    }

    for condition in schema.conditions() {
        match condition {
            Condition::RequiredWhen {
                field,
                equals,
                required,
                message,
            } => {
                let triggered = desired
                    .get(field)
                    .is_some_and(|value| value.equivalent(equals));
                let missing = required
                    .iter()
                    .any(|name| desired.get(name).is_none_or(FieldValue::is_empty));
                if triggered && missing {
                    errors.push(Violation::general(message.clone()));
                }
            }
            Condition::Custom { name, check } => {
                if let Some(message) = check(desired) {
                    log::debug!("condition '{name}' violated");
                    errors.push(Violation::general(message));
                }
            }
        }
    }

    for spec in schema.fields() {
        let Some(format) = spec.format else {
            continue;
        };
        let Some(value) = desired.get(&spec.name).filter(|v| !v.is_empty()) else {
            continue;
        };
        let invalid: Vec<String> = match value {
            FieldValue::List(items) => items
                .iter()
                .filter(|item| !format.matches(item))
                .cloned()
                .collect(),
            other => {
                let text = text_of(other);
                if format.matches(&text) {
                    Vec::new()
                } else {
                    vec![text]
                }
            }
        };
        for bad in invalid {
            errors.push(Violation::field(
                &spec.name,
                format!(
                    "provided {} '{}' is not a valid {}",
                    spec.name,
                    bad,
                    format.description()
                ),
            ));
        }
    }

    errors.into_result()
}

fn check_required(desired: &DesiredState, name: &str, errors: &mut ValidationErrors) {
    if desired.get(name).is_none_or(FieldValue::is_empty) {
        errors.push(Violation::field(name, format!("field '{name}' is required")));
    }
}

fn has_kind(value: &FieldValue, kind: FieldType) -> bool {
    matches!(
        (value, kind),
        (FieldValue::Bool(_), FieldType::Bool)
            | (FieldValue::Int(_), FieldType::Int)
            | (FieldValue::Str(_), FieldType::Str)
            | (FieldValue::List(_), FieldType::List)
    )
}

fn text_of(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => s.clone(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Null => String::new(),
        FieldValue::List(items) => items.join(","),
    }
}
