//! Execution - connect, check, confirm, apply, report

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    Action, Checked, DesiredState, Engine, Presence, ReconcileReport, ResourceSchema, RunOptions,
    RunState, Transport,
};
use opnapi::OpnSenseClient;

use crate::resource::Adapter;
use crate::{Context, config, progress, ui};

use super::differ::display_diff;

/// Options for one execution (adds the confirmation skip to the run options)
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Reload the service after a change
    pub reload: bool,
    /// Whether the item should exist
    pub state: Presence,
    /// Skip confirmation prompts
    pub yes: bool,
}

impl ExecuteOptions {
    fn run_options(&self) -> RunOptions {
        RunOptions::default()
            .dry_run(self.dry_run)
            .reload(self.reload)
            .state(self.state)
    }
}

/// Open a session for a resource
///
/// The per-call timeout is the larger of the configured one and the one the
/// resource asks for.
pub fn connect(ctx: &Context, schema: &ResourceSchema) -> Result<OpnSenseClient> {
    let config = config::connection(&ctx.connection)?;
    let client = OpnSenseClient::new(&config)
        .with_context(|| format!("Could not set up a client for {}", config.firewall))?;

    let timeout = schema
        .timeout()
        .map_or(client.timeout(), |t| t.max(client.timeout()));
    log::debug!("Connecting to {} (timeout {timeout:?})", client.base_url());
    Ok(client.with_timeout(timeout))
}

/// Run `f` against the client, then close the session whatever happened
pub fn with_session<R>(
    client: &OpnSenseClient,
    f: impl FnOnce(&OpnSenseClient) -> Result<R>,
) -> Result<R> {
    let result = f(client);
    if let Err(e) = client.close() {
        log::warn!("Failed to close session: {e}");
    }
    result
}

/// Reconcile one resource with a desired state
pub fn execute(
    ctx: &Context,
    adapter: &Adapter,
    desired: &DesiredState,
    opts: &ExecuteOptions,
) -> Result<ReconcileReport> {
    let client = connect(ctx, &adapter.schema)?;
    with_session(&client, |client| {
        let engine = Engine::new(adapter.schema.clone(), client);
        run(ctx, &engine, adapter.name(), desired, opts)
    })
}

fn run(
    ctx: &Context,
    engine: &Engine<'_, OpnSenseClient>,
    resource: &str,
    desired: &DesiredState,
    opts: &ExecuteOptions,
) -> Result<ReconcileReport> {
    let run_opts = opts.run_options();

    // 1. Validate, fetch and diff
    let pb = progress::spinner(format!("Checking {resource}..."), ctx.quiet);
    let checked = engine.check(desired, &run_opts);
    progress::finish_clear(&pb);
    let checked = checked.with_context(|| format!("Failed to check {resource}"))?;

    // 2. Display what will change
    if !ctx.quiet {
        display_diff(resource, &checked, ctx.verbose > 0);
    }

    if !checked.is_changed() {
        return Ok(engine.apply(checked, &run_opts)?);
    }

    if opts.dry_run {
        eprintln!();
        ui::info("Dry run - no changes made");
        return Ok(engine.apply(checked, &run_opts)?);
    }

    // 3. Confirm (unless --yes)
    if !opts.yes && !confirm_proceed(&checked)? {
        eprintln!();
        ui::warn("Aborted - no changes made");
        return Ok(engine.apply(checked, &run_opts.dry_run(true))?);
    }

    // 4. Apply (and reload)
    let action = checked.action().clone();
    let pb = progress::spinner(format!("Applying {resource}..."), ctx.quiet);
    let report = engine.apply(checked, &run_opts);
    progress::finish_clear(&pb);
    let report = report.with_context(|| format!("Failed to apply {resource}"))?;

    // 5. Summary
    if !ctx.quiet {
        print_summary(resource, &action, &report);
    }
    Ok(report)
}

/// Confirm with user
fn confirm_proceed(checked: &Checked) -> Result<bool> {
    use dialoguer::Confirm;

    let prompt = match checked.action() {
        Action::Delete(_) => "Remove this item?",
        _ => "Apply these changes?",
    };
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(resource: &str, action: &Action, report: &ReconcileReport) {
    eprintln!();
    let verb = match action {
        Action::Create => "created",
        Action::Delete(_) => "removed",
        Action::Update(_) | Action::Noop => "updated",
    };
    if report.changed {
        ui::success(&format!("{} {verb}", resource.bold()));
    }

    match (report.state, &report.reload_error) {
        (RunState::Reloaded, _) => eprintln!("    • service reloaded"),
        (_, Some(error)) => {
            ui::error(&format!("Reload failed: {error}"));
            eprintln!("    • the change was applied; reload the service manually");
        }
        _ => {}
    }
}
