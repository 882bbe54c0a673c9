//! Diff display - field-level before/after summary for one resource

use colored::Colorize;
use declarative::{Action, Checked, Diff, FieldValue};
use std::collections::BTreeSet;

/// How one field differs between the appliance and the desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange<'a> {
    Added(&'a FieldValue),
    Removed(&'a FieldValue),
    Modified {
        from: &'a FieldValue,
        to: &'a FieldValue,
    },
    Unchanged(&'a FieldValue),
}

/// Per-field changes of a diff, in field-name order
pub fn field_changes(diff: &Diff) -> Vec<(&str, FieldChange<'_>)> {
    let names: BTreeSet<&str> = diff
        .before
        .keys()
        .chain(diff.after.keys())
        .map(String::as_str)
        .collect();

    names
        .into_iter()
        .filter_map(|name| {
            let change = match (diff.before.get(name), diff.after.get(name)) {
                (Some(from), Some(to)) if from.equivalent(to) => FieldChange::Unchanged(from),
                (Some(from), Some(to)) => FieldChange::Modified { from, to },
                (None, Some(to)) => FieldChange::Added(to),
                (Some(from), None) => FieldChange::Removed(from),
                (None, None) => return None,
            };
            Some((name, change))
        })
        .collect()
}

/// Display the planned change of a checked run
pub fn display_diff(resource: &str, checked: &Checked, verbose: bool) {
    if !checked.is_changed() {
        eprintln!();
        eprintln!("  {} {} is up to date", "✓".green(), resource.bold());
        return;
    }

    let title = match checked.action() {
        Action::Create => "create",
        Action::Delete(_) => "remove",
        Action::Update(_) | Action::Noop => "update",
    };

    eprintln!();
    eprintln!(
        "┌─ {} ─────────────────────────────────────────┐",
        format!("{resource} ({title})").bold()
    );
    eprintln!("│");

    let changes = field_changes(checked.diff());
    let mut count = 0;
    for (name, change) in &changes {
        match change {
            FieldChange::Added(value) => {
                count += 1;
                eprintln!("│   {} {:<20} {}", "+".green(), name, value);
            }
            FieldChange::Removed(value) => {
                count += 1;
                eprintln!("│   {} {:<20} {}", "-".red(), name, value.to_string().dimmed());
            }
            FieldChange::Modified { from, to } => {
                count += 1;
                eprintln!(
                    "│   {} {:<20} {} → {}",
                    "~".yellow(),
                    name,
                    from.to_string().dimmed(),
                    to
                );
            }
            FieldChange::Unchanged(value) if verbose => {
                eprintln!("│     {:<20} {}", name.dimmed(), value.to_string().dimmed());
            }
            FieldChange::Unchanged(_) => {}
        }
    }

    eprintln!("│");
    eprintln!("├─────────────────────────────────────────────────────┤");
    eprintln!("│ Summary: {} field(s) differ", count.to_string().bold());
    eprintln!("└─────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ActualState, DesiredState};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_changes() {
        let actual: ActualState = [
            ("enabled".to_string(), FieldValue::Bool(false)),
            ("port".to_string(), FieldValue::Int(3128)),
            ("local_ips".to_string(), FieldValue::from(&["10.0.0.2", "10.0.0.1"][..])),
        ]
        .into_iter()
        .collect();
        let desired = DesiredState::new()
            .with("enabled", true)
            .with("port", 3128)
            .with("local_ips", &["10.0.0.1", "10.0.0.2"][..]);

        let diff = Diff::compute(&desired, &actual, &[]);
        let changes = field_changes(&diff);

        assert_eq!(
            changes,
            vec![
                (
                    "enabled",
                    FieldChange::Modified {
                        from: &FieldValue::Bool(false),
                        to: &FieldValue::Bool(true),
                    }
                ),
                (
                    "local_ips",
                    FieldChange::Unchanged(&FieldValue::from(&["10.0.0.2", "10.0.0.1"][..]))
                ),
                ("port", FieldChange::Unchanged(&FieldValue::Int(3128))),
            ]
        );
    }

    #[test]
    fn test_creation_is_all_added() {
        let desired = DesiredState::new().with("name", "site-a").with("type", "rsa");
        let diff = Diff::creation(&desired, &[]);
        assert!(
            field_changes(&diff)
                .iter()
                .all(|(_, change)| matches!(change, FieldChange::Added(_)))
        );
    }
}
