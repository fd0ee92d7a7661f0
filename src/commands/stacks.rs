//! Engine operations across stacks.
//!
//! A batch selects stacks, builds a context for each, binds each to its
//! engine revision, installs missing engine versions once, then runs the
//! operation on a rayon pool. Every child process gets the stack directory as
//! its working directory, so stacks run side by side safely.

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};
use tfkit::{
    Adapter, ExecutionResult, FlagValue, PlanStatus, ProcessRunner, Runner, StackContext,
    Subcommand, VersionManager,
};

use crate::Context;
use crate::cli::{AuditArgs, ShowArgs, StackArgs};
use crate::{paths, progress, stack, ui};

/// Operation run on every selected stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Plan,
    Quickplan,
    Audit,
    Apply,
    Refresh,
    Destroy,
    Fmt,
    Lint,
    Validate,
    Clean,
    Upgrade,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Self::Init => "Initializing",
            Self::Plan | Self::Quickplan => "Planning",
            Self::Audit => "Auditing",
            Self::Apply => "Applying",
            Self::Refresh => "Refreshing",
            Self::Destroy => "Destroying",
            Self::Fmt => "Formatting",
            Self::Lint => "Linting",
            Self::Validate => "Validating",
            Self::Clean => "Cleaning",
            Self::Upgrade => "Upgrading",
        }
    }
}

/// How one stack came out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Changed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StackResult {
    pub name: String,
    pub outcome: Outcome,
    pub message: String,
    /// Engine output worth showing (plan diff, plan errors).
    pub output: Option<String>,
}

impl StackResult {
    fn new(name: &str, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            message: message.into(),
            output: None,
        }
    }

    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, Outcome::Ok, message)
    }

    fn failed(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, Outcome::Failed, message)
    }

    fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output = Some(output);
        }
        self
    }
}

/// Counts per outcome.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[StackResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.outcome {
                Outcome::Ok => summary.ok += 1,
                Outcome::Changed => summary.changed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Entry points
// ============================================================================

pub fn run(ctx: &Context, op: Operation, args: &StackArgs) -> Result<()> {
    let results = batch(ctx, op, &args.stacks, args.jobs)?;
    finish(ctx, &results)
}

/// Audit stacks, optionally writing a JSON report next to the project file.
pub fn audit(ctx: &Context, args: &AuditArgs) -> Result<()> {
    let start = unix_now();
    let results = batch(ctx, Operation::Audit, &args.stacks.stacks, args.stacks.jobs)?;
    if args.report {
        write_report(ctx, &results, start)?;
    }
    finish(ctx, &results)
}

/// Print the saved plan of each stack.
pub fn show(ctx: &Context, args: &ShowArgs) -> Result<()> {
    let names = stack::select(&ctx.config, &args.stacks)?;
    let manager = VersionManager::new(ctx.config.manager_config());
    let runner = ProcessRunner::new();
    let mut failed = Vec::new();

    for name in &names {
        let stack_ctx = stack::context(&ctx.config, name)?;
        let adapter = match Adapter::prepare(&manager, &runner, &stack_ctx) {
            Ok(adapter) => adapter,
            Err(e) => {
                ui::error(&format!("{}: {}", name, e));
                failed.push(name.clone());
                continue;
            }
        };
        if !adapter.planned() {
            log::debug!("{}: no plan file", name);
            continue;
        }

        let plan = match adapter.show_plan() {
            Ok(plan) => plan,
            Err(e) => {
                ui::error(&format!("{}: {}", name, e));
                failed.push(name.clone());
                continue;
            }
        };

        if args.checksum {
            println!("{}  {}", plan.checksum(), plan.stack_identifier());
        } else if args.markdown {
            println!("{}", plan.to_markdown());
        } else {
            ui::header(&plan.stack_identifier());
            ui::content(plan.data());
            println!();
            ui::content(plan.summary());
        }
    }

    if !failed.is_empty() {
        bail!("Could not read plans: {}", failed.join(", "));
    }
    Ok(())
}

/// List stacks with the engine version each resolves to.
pub fn list(ctx: &Context) -> Result<()> {
    let names = stack::discover(&ctx.config.base_path());
    if names.is_empty() {
        ui::warn(&format!(
            "No stacks under {}",
            ctx.config.base_path().display()
        ));
        return Ok(());
    }

    let manager = VersionManager::new(ctx.config.manager_config());
    let runner = ProcessRunner::new();

    ui::header(&format!("Stacks in {} ({})", ctx.config.base_folder, names.len()));
    for name in &names {
        let stack_ctx = stack::context(&ctx.config, name)?;
        match Adapter::prepare(&manager, &runner, &stack_ctx) {
            Ok(adapter) => {
                let planned = if adapter.planned() {
                    " planned".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {}{}",
                    "●".green(),
                    name,
                    format!("terraform {} ({})", adapter.version(), adapter.revision()).dimmed(),
                    planned
                );
            }
            Err(e) => println!("  {} {} {}", "○".red(), name, e.to_string().dimmed()),
        }
    }
    Ok(())
}

// ============================================================================
// Batch
// ============================================================================

fn batch(ctx: &Context, op: Operation, requested: &[String], jobs: usize) -> Result<Vec<StackResult>> {
    let names = stack::select(&ctx.config, requested)?;
    if names.is_empty() {
        ui::warn(&format!(
            "No stacks under {}",
            ctx.config.base_path().display()
        ));
        return Ok(Vec::new());
    }

    ui::header(&format!(
        "{} {} stack{} in {}",
        op.verb(),
        names.len(),
        if names.len() == 1 { "" } else { "s" },
        ctx.config.base_folder
    ));
    if jobs > 1 {
        ui::kv("Parallel jobs", &jobs.to_string());
    }
    println!();

    let mut results = Vec::new();
    let mut contexts = Vec::new();
    for name in &names {
        match stack::context(&ctx.config, name) {
            Ok(stack_ctx) => contexts.push(stack_ctx),
            Err(e) => results.push(StackResult::failed(name, format!("{:#}", e))),
        }
    }

    if op == Operation::Clean {
        results.extend(parallel(jobs, &contexts, clean)?);
    } else {
        if op == Operation::Upgrade {
            // Upgrade inits skip backend configuration.
            for stack_ctx in &mut contexts {
                stack_ctx
                    .overrides
                    .entry(Subcommand::Init)
                    .or_default()
                    .insert("backend".to_string(), FlagValue::Bool(false));
            }
        }

        let manager = VersionManager::new(ctx.config.manager_config());
        let runner = ProcessRunner::new();

        let mut adapters = Vec::new();
        for stack_ctx in &contexts {
            match Adapter::prepare(&manager, &runner, stack_ctx) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => results.push(StackResult::failed(&stack_ctx.name, e.to_string())),
            }
        }

        let install_failures = preinstall(ctx, &manager, &adapters);
        adapters.retain(|adapter| match install_failures.get(adapter.version()) {
            Some(error) => {
                results.push(StackResult::failed(&adapter.stack().name, error.clone()));
                false
            }
            None => true,
        });

        results.extend(parallel(jobs, &adapters, |adapter| {
            perform(op, adapter, &manager, &runner)
        })?);
    }

    results.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(results)
}

fn parallel<T, F>(jobs: usize, items: &[T], f: F) -> Result<Vec<StackResult>>
where
    T: Sync,
    F: Fn(&T) -> StackResult + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to build thread pool")?;
    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}

/// Install every missing version once, up front. Returns install errors by
/// version.
fn preinstall(
    ctx: &Context,
    manager: &VersionManager,
    adapters: &[Adapter<'_>],
) -> BTreeMap<String, String> {
    let missing: BTreeSet<&str> = adapters
        .iter()
        .filter(|adapter| adapter.stack().options.autoinstall)
        .map(|adapter| adapter.version())
        .filter(|version| manager.get(version).is_none())
        .collect();

    let mut failures = BTreeMap::new();
    for version in missing {
        let pb = progress::spinner(&format!("Installing terraform {}", version), ctx.quiet);
        match manager.install(version) {
            Ok(_) => progress::finish_success(&pb, &format!("Installed terraform {}", version)),
            Err(e) => {
                progress::finish_clear(&pb);
                failures.insert(
                    version.to_string(),
                    format!("Failed to install terraform {}: {}", version, e),
                );
            }
        }
    }
    failures
}

fn finish(ctx: &Context, results: &[StackResult]) -> Result<()> {
    for result in results {
        report(ctx, result);
    }

    let summary = BatchSummary::from_results(results);
    if results.is_empty() {
        return Ok(());
    }

    println!();
    let line = format!(
        "{} ok, {} changed, {} failed, {} skipped",
        summary.ok, summary.changed, summary.failed, summary.skipped
    );
    if summary.is_success() {
        ui::success(&line);
        Ok(())
    } else {
        ui::error(&line);
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| r.outcome == Outcome::Failed)
            .map(|r| r.name.as_str())
            .collect();
        bail!("Failed stacks: {}", failed.join(", "))
    }
}

fn report(ctx: &Context, result: &StackResult) {
    let line = format!("{}: {}", result.message, result.name);
    match result.outcome {
        Outcome::Ok => ui::success(&line),
        Outcome::Changed => ui::warn(&line),
        Outcome::Failed => ui::error(&line),
        Outcome::Skipped => ui::dim(&line),
    }

    if let Some(output) = &result.output
        && (result.outcome == Outcome::Failed || !ctx.quiet)
    {
        ui::content(output);
    }
}

#[derive(Serialize)]
struct AuditReport<'a> {
    start: u64,
    finish: u64,
    stacks: BTreeMap<&'a str, Outcome>,
    error: Vec<String>,
}

fn write_report(ctx: &Context, results: &[StackResult], start: u64) -> Result<()> {
    let base = &ctx.config.base_folder;
    let report = AuditReport {
        start,
        finish: unix_now(),
        stacks: results
            .iter()
            .map(|r| (r.name.as_str(), r.outcome))
            .collect(),
        error: results
            .iter()
            .filter(|r| r.outcome == Outcome::Failed)
            .map(|r| format!("{}/{}", base, r.name))
            .collect(),
    };

    let path = ctx.config.root().join(format!("{}.audit.json", base));
    ui::info(&format!("Writing report: {}", path.display()));
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ============================================================================
// Per-stack operations
// ============================================================================

fn clean(stack_ctx: &StackContext) -> StackResult {
    match stack_ctx.cleanup.apply(&stack_ctx.path) {
        Ok(removed) => {
            for path in &removed {
                log::debug!(
                    "{}: removed {}",
                    stack_ctx.name,
                    paths::display_relative(path, &stack_ctx.path)
                );
            }
            StackResult::ok(
                &stack_ctx.name,
                format!("Cleaned {} path{}", removed.len(), if removed.len() == 1 { "" } else { "s" }),
            )
        }
        Err(e) => StackResult::failed(&stack_ctx.name, format!("Clean failed: {}", e)),
    }
}

fn perform(
    op: Operation,
    adapter: &Adapter<'_>,
    manager: &VersionManager,
    runner: &dyn Runner,
) -> StackResult {
    let name = adapter.stack().name.as_str();
    log::info!(
        "{} {} with terraform {}",
        op.verb(),
        name,
        adapter.version()
    );

    let result = match op {
        Operation::Init => adapter
            .init()
            .map(|r| expect_success(name, &r, "Initialized", "Initialization failed")),
        Operation::Plan => plan(adapter, false),
        Operation::Quickplan => quickplan(adapter, false),
        Operation::Audit => quickplan(adapter, true),
        Operation::Apply => apply(adapter),
        Operation::Refresh => adapter
            .refresh()
            .map(|r| expect_success(name, &r, "Refreshed", "Refresh failed")),
        Operation::Destroy => adapter
            .destroy()
            .map(|r| expect_success(name, &r, "Destroyed", "Destroy failed")),
        Operation::Fmt => adapter
            .fmt()
            .map(|r| expect_success(name, &r, "Formatted", "Formatting failed")),
        Operation::Lint => adapter
            .lint()
            .map(|r| expect_success(name, &r, "Formatting OK", "Bad formatting")),
        Operation::Validate => adapter
            .validate()
            .map(|r| expect_success(name, &r, "Validated", "Validation failed")),
        Operation::Upgrade => upgrade(adapter, manager, runner),
        Operation::Clean => return clean(adapter.stack()),
    };

    result.unwrap_or_else(|e| StackResult::failed(name, e.to_string()))
}

fn expect_success(name: &str, result: &ExecutionResult, ok: &str, failed: &str) -> StackResult {
    if result.success() {
        StackResult::ok(name, ok)
    } else {
        StackResult::failed(name, format!("{} (exit {})", failed, result.exit_code))
            .with_output(result.stderr())
    }
}

fn plan(adapter: &Adapter<'_>, audit: bool) -> tfkit::Result<StackResult> {
    let name = adapter.stack().name.as_str();
    let outcome = adapter.plan()?;
    Ok(match outcome.status() {
        PlanStatus::Clean => StackResult::ok(name, "No changes"),
        PlanStatus::Changed if audit => {
            StackResult::failed(name, "Dirty stack").with_output(outcome.output)
        }
        PlanStatus::Changed => {
            StackResult::new(name, Outcome::Changed, "Changes detected").with_output(outcome.output)
        }
        PlanStatus::Failed => StackResult::failed(name, "Plan failed").with_output(outcome.output),
    })
}

fn quickplan(adapter: &Adapter<'_>, audit: bool) -> tfkit::Result<StackResult> {
    let name = adapter.stack().name.as_str();
    adapter.clean()?;
    let init = adapter.init()?;
    if !init.success() {
        return Ok(expect_success(name, &init, "Initialized", "Initialization failed"));
    }
    plan(adapter, audit)
}

fn apply(adapter: &Adapter<'_>) -> tfkit::Result<StackResult> {
    let name = adapter.stack().name.as_str();
    if !adapter.planned() {
        return Ok(StackResult::new(name, Outcome::Skipped, "No plan file"));
    }

    let result = adapter.apply()?;
    if result.success() {
        // A saved plan is stale once applied.
        adapter.remove_plan_file()?;
    }
    Ok(expect_success(name, &result, "Applied", "Apply failed"))
}

/// Clean, init without backend, upgrade, then format with the new engine.
fn upgrade(
    adapter: &Adapter<'_>,
    manager: &VersionManager,
    runner: &dyn Runner,
) -> tfkit::Result<StackResult> {
    let name = adapter.stack().name.as_str();
    if !adapter.revision().is_upgradeable() {
        return Ok(StackResult::new(
            name,
            Outcome::Skipped,
            format!("terraform {} has no upgrade path", adapter.version()),
        ));
    }

    adapter.clean()?;
    let init = adapter.init()?;
    if !init.success() {
        return Ok(expect_success(name, &init, "Initialized", "Initialization failed"));
    }

    let result = adapter.upgrade()?;
    if !result.success() {
        return Ok(expect_success(name, &result, "Upgraded", "Upgrade failed"));
    }

    // A configured pin names the old line; format with the line just written.
    let mut next = adapter.stack().clone();
    next.options.version = adapter.revision().next_constraint();
    let upgraded = Adapter::prepare(manager, runner, &next)?;
    let fmt = upgraded.fmt()?;
    if !fmt.success() {
        return Ok(expect_success(name, &fmt, "Upgraded", "Formatting failed"));
    }
    Ok(StackResult::ok(
        name,
        format!("Upgraded to terraform {}", upgraded.version()),
    ))
}
