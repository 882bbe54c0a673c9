//! Declarative commands
//!
//! - `show` - Print the normalized configuration held by the appliance
//! - `check` - Compare a desired-state file against the appliance
//! - `apply` - Make the appliance match a desired-state file

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{ActualState, DesiredState, Engine, Presence};
use serde_json::{Value, json};

use crate::Context;
use crate::cli::{ApplyArgs, CheckArgs};
use crate::config::DesiredFile;
use crate::engine::{self, ExecuteOptions};
use crate::resource::{self, Adapter};
use crate::{progress, ui};

/// Show the current configuration of a resource
pub fn show(ctx: &Context, resource: &str, key: Option<&str>) -> Result<()> {
    let adapter = resource::find(resource)?;
    let client = engine::connect(ctx, &adapter.schema)?;

    let pb = progress::spinner(format!("Fetching {resource}..."), ctx.quiet);
    let actual = engine::with_session(&client, |client| {
        let engine = Engine::new(adapter.schema.clone(), client);
        let actual = match key {
            Some(key) => engine.search_item(key)?,
            None => engine.search()?,
        };
        Ok(actual)
    });
    progress::finish_clear(&pb);
    let actual = actual.with_context(|| format!("Failed to fetch {resource}"))?;

    let Some(actual) = actual else {
        let key_field = adapter.schema.key_field().unwrap_or("key");
        bail!(
            "No {resource} item with {key_field} '{}'",
            key.unwrap_or_default()
        );
    };
    ui::json(&visible(&adapter, &actual))
}

/// Compare a desired-state file against the appliance without changing it
pub fn check(ctx: &Context, args: &CheckArgs) -> Result<()> {
    let adapter = resource::find(&args.resource)?;
    let file = DesiredFile::load(&args.file)?;
    let state = args.state.map(Presence::from).or(file.run.state).unwrap_or_default();
    let desired = desired_state(&adapter, &file, state)?;

    let opts = ExecuteOptions {
        dry_run: true,
        reload: false,
        state,
        yes: true,
    };
    let report = engine::execute(ctx, &adapter, &desired, &opts)?;

    let mut result = report.result();
    result["would_change"] = json!(report.diff.changed);
    ui::json(&result)
}

/// Reconcile the appliance with a desired-state file
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let adapter = resource::find(&args.resource)?;
    let file = DesiredFile::load(&args.file)?;
    let state = args.state.map(Presence::from).or(file.run.state).unwrap_or_default();
    let desired = desired_state(&adapter, &file, state)?;

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        reload: args.reload || file.run.reload.unwrap_or(false),
        state,
        yes: args.yes,
    };
    let report = engine::execute(ctx, &adapter, &desired, &opts)?;
    ui::json(&report.result())?;

    if let Some(error) = &report.reload_error {
        bail!("{} was changed but the reload failed: {error}", adapter.name());
    }
    Ok(())
}

fn desired_state(adapter: &Adapter, file: &DesiredFile, state: Presence) -> Result<DesiredState> {
    adapter.desired_state(&file.fields, state == Presence::Present)
}

/// Actual state without the fields that are never shown
fn visible(adapter: &Adapter, actual: &ActualState) -> Value {
    let excluded = adapter.schema.diff_excluded();
    let fields: serde_json::Map<String, Value> = actual
        .iter()
        .filter(|(name, _)| !excluded.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), json!(value)))
        .collect();
    Value::Object(fields)
}
