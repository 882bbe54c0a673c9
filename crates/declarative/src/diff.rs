//! Diff computation for resources

use serde::Serialize;

use crate::types::{ActualState, DesiredState, FieldMap, FieldValue};

/// Before/after view of one resource plus the change verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    /// Actual state without excluded fields
    pub before: FieldMap,
    /// Desired state limited to fields the appliance reports, without excluded fields
    pub after: FieldMap,
    /// Whether any compared field differs
    #[serde(skip)]
    pub changed: bool,
}

impl Diff {
    /// Diff an existing resource
    ///
    /// Only fields present in `actual` are compared, so a desired field the
    /// appliance does not know about never shows up. Excluded fields never
    /// appear and never count as a change.
    pub fn compute(desired: &DesiredState, actual: &ActualState, exclude: &[&str]) -> Self {
        let before: FieldMap = actual
            .iter()
            .filter(|(name, _)| !exclude.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let after: FieldMap = desired
            .iter()
            .filter(|(name, _)| actual.contains_key(*name))
            .filter(|(name, _)| !exclude.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let changed = after.iter().any(|(name, wanted)| {
            before
                .get(name)
                .is_some_and(|current| !current.equivalent(wanted))
        });

        Self {
            before,
            after,
            changed,
        }
    }

    /// Diff for an item that does not exist yet
    pub fn creation(desired: &DesiredState, exclude: &[&str]) -> Self {
        Self {
            before: FieldMap::new(),
            after: without(desired.iter(), exclude),
            changed: true,
        }
    }

    /// Diff for an item that will be removed
    pub fn removal(actual: &ActualState, exclude: &[&str]) -> Self {
        Self {
            before: without(actual.iter(), exclude),
            after: FieldMap::new(),
            changed: true,
        }
    }

    /// Diff for an item that is already gone
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Names of the fields whose values differ
    pub fn changed_fields(&self) -> Vec<&str> {
        self.after
            .iter()
            .filter(|(name, wanted)| {
                self.before
                    .get(*name)
                    .is_none_or(|current| !current.equivalent(wanted))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Copy with empty values stripped from both views
    pub fn without_empty(&self) -> Self {
        let strip = |map: &FieldMap| -> FieldMap {
            map.iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        };
        Self {
            before: strip(&self.before),
            after: strip(&self.after),
            changed: self.changed,
        }
    }
}

fn without<'a>(
    fields: impl Iterator<Item = (&'a String, &'a FieldValue)>,
    exclude: &[&str],
) -> FieldMap {
    fields
        .filter(|(name, _)| !exclude.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
