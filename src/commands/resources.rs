//! `opnrecon resources` - list manageable resource types

use anyhow::Result;
use colored::Colorize;
use declarative::{FieldSpec, ResourceKind};
use std::fmt::Write as _;

use crate::Context;
use crate::resource;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    for adapter in resource::all()? {
        let schema = &adapter.schema;
        ui::header(adapter.name());
        ui::dim(adapter.summary);

        let kind = match schema.kind() {
            ResourceKind::Settings => "settings".to_string(),
            ResourceKind::Item { key_field } => format!("item (key: {key_field})"),
        };
        ui::kv("kind", &kind);
        ui::kv("endpoint", &schema.search_ref().path());
        ui::kv(
            "reload",
            &schema
                .reload_ref()
                .map_or_else(|| "-".to_string(), |r| r.path()),
        );

        if ctx.quiet {
            continue;
        }
        eprintln!();
        for field in schema.fields() {
            eprintln!("  {}", describe(field));
        }
        for (alias, canonical) in adapter.aliases {
            ui::dim(&format!("{alias} → {canonical}"));
        }
    }
    Ok(())
}

fn describe(field: &FieldSpec) -> String {
    let mut line = format!("{:<16} {}", field.name.bold(), field.kind.name().dimmed());
    if field.required {
        let _ = write!(line, " {}", "required".yellow());
    }
    match (field.min, field.max) {
        (Some(min), Some(max)) => {
            let _ = write!(line, " [{min}..{max}]");
        }
        (Some(min), None) => {
            let _ = write!(line, " [>= {min}]");
        }
        (None, Some(max)) => {
            let _ = write!(line, " [<= {max}]");
        }
        (None, None) => {}
    }
    if let Some(format) = field.format {
        let _ = write!(line, " ({})", format.description());
    }
    if let Some(pattern) = &field.pattern {
        let _ = write!(line, " /{pattern}/");
    }
    if field.diff_exclude {
        let _ = write!(line, " {}", "hidden".dimmed());
    }
    line
}
