//! Engine operations bound to one stack and one resolved revision.
//!
//! An [`Adapter`] is prepared once per stack: it resolves the engine
//! version, selects the [`Revision`] row and then runs every delegated
//! operation with the stack directory as the child's working directory and
//! the resolved binary on the command line. The parent process never
//! changes directory, so adapters for different stacks can run on
//! different threads at the same time.

use super::Revision;
use crate::commands::exec::Runner;
use crate::commands::options::{FlagValue, Options};
use crate::commands::{Command, Subcommand};
use crate::error::{Error, Result};
use crate::planfile::{NO_CHANGES, PLAN_EXTENSION, PlanFile};
use crate::settings;
use crate::types::ExecutionResult;
use crate::version_manager::VersionManager;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Variable holding extra engine arguments.
pub const CLI_ARGS_VAR: &str = "TF_CLI_ARGS";

const NO_COLOR: &str = "-no-color";

/// Settings files whose version declarations are dropped during upgrades.
const STRIPPED_ON_UPGRADE: &[&str] = &["settings.tf", "backend.tf"];

/// What `clean` removes from a stack directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRules {
    /// Also remove directories left empty.
    pub empty: bool,
    /// File name globs (`*` and `?`) matched at any depth.
    pub patterns: Vec<String>,
}

impl Default for CleanupRules {
    fn default() -> Self {
        Self {
            empty: true,
            patterns: ["*.tfout", "*.tflock", "*.zip", ".terraform"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl CleanupRules {
    fn matchers(&self) -> Result<Vec<Regex>> {
        self.patterns
            .iter()
            .map(|pattern| {
                let source = format!(
                    "^{}$",
                    regex::escape(pattern)
                        .replace(r"\*", ".*")
                        .replace(r"\?", ".")
                );
                Regex::new(&source)
                    .map_err(|e| Error::Other(format!("invalid cleanup pattern {}: {}", pattern, e)))
            })
            .collect()
    }

    /// Remove everything under `root` whose name matches a pattern and,
    /// when enabled, directories that are empty. Returns the removed paths,
    /// sorted. Directories emptied by this run are left in place.
    pub fn apply(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let matchers = self.matchers()?;

        let mut removals: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                matchers.iter().any(|m| m.is_match(&name))
            })
            .map(|entry| entry.into_path())
            .collect();

        if self.empty {
            removals.extend(
                WalkDir::new(root)
                    .min_depth(1)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_dir())
                    .filter(|entry| is_empty_dir(entry.path()))
                    .map(|entry| entry.into_path()),
            );
        }

        removals.sort();
        removals.dedup();

        let mut removed = Vec::new();
        for path in removals {
            // A parent removed earlier takes its children with it.
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            let outcome = if meta.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            outcome.map_err(|e| Error::io(&path, e))?;
            log::info!("Removed {}", path.display());
            removed.push(path);
        }
        Ok(removed)
    }
}

/// Everything an adapter needs to know about a stack.
#[derive(Debug, Clone)]
pub struct StackContext {
    /// Stack name (its directory name).
    pub name: String,
    /// Stack directory.
    pub path: PathBuf,
    /// Name of the folder holding the stacks.
    pub base_folder: String,
    /// Options shared by every subcommand.
    pub options: Options,
    /// Per-subcommand flag overrides.
    pub overrides: BTreeMap<Subcommand, BTreeMap<String, FlagValue>>,
    /// Cleanup rules.
    pub cleanup: CleanupRules,
    /// Pass `-no-color` to every engine run through `TF_CLI_ARGS`.
    pub disable_color: bool,
    /// Per-stack version pin file removed after a successful upgrade.
    pub legacy_config: Option<PathBuf>,
}

impl StackContext {
    /// Context for the stack at `path` with default options.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base_folder = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name: name.into(),
            path,
            base_folder,
            options: Options::new(),
            overrides: BTreeMap::new(),
            cleanup: CleanupRules::default(),
            disable_color: false,
            legacy_config: None,
        }
    }

    /// Plan file name, relative to the stack directory.
    #[must_use]
    pub fn plan_file(&self) -> String {
        format!("{}.{}", self.name, PLAN_EXTENSION)
    }

    /// Absolute plan file path.
    #[must_use]
    pub fn plan_path(&self) -> PathBuf {
        self.path.join(self.plan_file())
    }

    /// State file name, relative to the stack directory.
    #[must_use]
    pub fn state_file(&self) -> &'static str {
        "terraform.tfstate"
    }

    /// Options for one subcommand: the shared options plus its overrides.
    #[must_use]
    pub fn options_for(&self, subcommand: Subcommand) -> Options {
        let mut options = self.options.clone();
        if let Some(overrides) = self.overrides.get(&subcommand) {
            options.merge(overrides.iter().map(|(k, v)| (k.as_str(), v.clone())));
        }
        if self.disable_color {
            let mut args: Vec<String> = options
                .environment
                .get(CLI_ARGS_VAR)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            if !args.iter().any(|a| a == NO_COLOR) {
                args.push(NO_COLOR.to_string());
            }
            options.env(CLI_ARGS_VAR, args.join(" "));
        }
        options
    }
}

/// How a plan run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    /// Nothing to change.
    Clean,
    /// The engine failed.
    Failed,
    /// Changes are pending.
    Changed,
}

/// Exit code and relevant output of a plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Engine exit code.
    pub exit_code: i32,
    /// The no-change message, stderr on failure, stdout when changed.
    pub output: String,
}

impl PlanOutcome {
    fn from_result(result: &ExecutionResult) -> Self {
        let output = match result.exit_code {
            0 => NO_CHANGES.to_string(),
            2 => result.stdout().to_string(),
            _ => result.stderr().to_string(),
        };
        Self {
            exit_code: result.exit_code,
            output,
        }
    }

    /// Status implied by the exit code.
    #[must_use]
    pub fn status(&self) -> PlanStatus {
        match self.exit_code {
            0 => PlanStatus::Clean,
            2 => PlanStatus::Changed,
            _ => PlanStatus::Failed,
        }
    }
}

/// A stack bound to its engine revision.
pub struct Adapter<'a> {
    revision: &'static Revision,
    version: String,
    manager: &'a VersionManager,
    runner: &'a dyn Runner,
    stack: &'a StackContext,
}

impl<'a> Adapter<'a> {
    /// Resolve the stack's engine version and select its revision.
    ///
    /// The version comes from, in order: the configured constraint, the
    /// stack's `required_version`, the highest installed binary, and (when
    /// autoinstall is on) the latest published release. Nothing is
    /// installed here.
    ///
    /// # Errors
    ///
    /// Resolution errors, `Error::NotInstalled` when no source yields a
    /// version, and `Error::UnsupportedRevision` when the version has no
    /// revision row.
    pub fn prepare(
        manager: &'a VersionManager,
        runner: &'a dyn Runner,
        stack: &'a StackContext,
    ) -> Result<Self> {
        let version = Self::select_version(manager, stack)?;
        let revision = Revision::for_version(&version)?;
        log::debug!("{}: terraform {} ({})", stack.name, version, revision);

        Ok(Self {
            revision,
            version,
            manager,
            runner,
            stack,
        })
    }

    fn select_version(manager: &VersionManager, stack: &StackContext) -> Result<String> {
        if let Some(constraint) = &stack.options.version {
            return manager.resolve(constraint);
        }
        if let Some(constraint) = settings::required_version(&stack.path) {
            return manager.resolve(&constraint);
        }
        if let Some((version, _)) = manager.inventory().latest() {
            return Ok(version.to_string());
        }
        if stack.options.autoinstall {
            return manager.latest();
        }
        Err(manager.missing_error(None))
    }

    /// The selected revision.
    #[must_use]
    pub fn revision(&self) -> &'static Revision {
        self.revision
    }

    /// The resolved engine version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The stack.
    #[must_use]
    pub fn stack(&self) -> &StackContext {
        self.stack
    }

    /// `init`.
    pub fn init(&self) -> Result<ExecutionResult> {
        let options = self.stack.options_for(Subcommand::Init);
        self.run(Subcommand::Init, options, None, false)
    }

    /// `plan`, saving the plan file and capturing its output.
    pub fn plan(&self) -> Result<PlanOutcome> {
        let mut options = self.stack.options_for(Subcommand::Plan);
        options
            .set("state", self.stack.state_file())
            .set("out", self.stack.plan_file())
            .set("no-color", true);
        let result = self.run(Subcommand::Plan, options, None, true)?;
        let outcome = PlanOutcome::from_result(&result);
        log::debug!("{}: plan exited {}", self.stack.name, outcome.exit_code);
        Ok(outcome)
    }

    /// `apply` of the saved plan file.
    pub fn apply(&self) -> Result<ExecutionResult> {
        let options = self.stack.options_for(Subcommand::Apply);
        let plan_file = self.stack.plan_file();
        self.run(Subcommand::Apply, options, Some(&plan_file), false)
    }

    /// `refresh`.
    pub fn refresh(&self) -> Result<ExecutionResult> {
        let mut options = self.stack.options_for(Subcommand::Refresh);
        options.set("state", self.stack.state_file());
        self.run(Subcommand::Refresh, options, None, false)
    }

    /// `destroy`.
    pub fn destroy(&self) -> Result<ExecutionResult> {
        let mut options = self.stack.options_for(Subcommand::Destroy);
        options.set("state", self.stack.state_file());
        self.run(Subcommand::Destroy, options, None, false)
    }

    /// `fmt`.
    pub fn fmt(&self) -> Result<ExecutionResult> {
        let options = self.stack.options_for(Subcommand::Fmt);
        self.run(Subcommand::Fmt, options, None, false)
    }

    /// `fmt -check`: fails when any file needs formatting.
    pub fn lint(&self) -> Result<ExecutionResult> {
        let mut options = self.stack.options_for(Subcommand::Fmt);
        options.set("check", true);
        self.run(Subcommand::Fmt, options, None, false)
    }

    /// `validate`.
    pub fn validate(&self) -> Result<ExecutionResult> {
        let options = self.stack.options_for(Subcommand::Validate);
        self.run(Subcommand::Validate, options, None, false)
    }

    /// `version`.
    pub fn engine_version(&self) -> Result<ExecutionResult> {
        let options = self.stack.options_for(Subcommand::Version);
        self.run(Subcommand::Version, options, None, true)
    }

    /// Apply the stack's cleanup rules. See [`CleanupRules::apply`].
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        self.stack.cleanup.apply(&self.stack.path)
    }

    /// Upgrade the stack to the next release line.
    ///
    /// Pins `~> <next>.0` in `versions.tf` after dropping declarations from
    /// the other settings files, then runs the next line's upgrade
    /// subcommand with that line's binary. On success the legacy per-stack
    /// configuration file is removed.
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedOperation` on revisions that cannot be upgraded;
    /// nothing is touched in that case.
    pub fn upgrade(&self) -> Result<ExecutionResult> {
        let (Some(path), Some(constraint)) =
            (self.revision.upgrade_path(), self.revision.next_constraint())
        else {
            return Err(self.unsupported("upgrade"));
        };

        let mut options = self.stack.options_for(Subcommand::Upgrade);
        options.set("yes", true);
        let command = self.command(Subcommand::Upgrade, options, None).word(path.word);
        command.arguments()?;

        let next = self.manager.resolve(&constraint)?;
        let binary = self.binary(&next)?;

        for file in STRIPPED_ON_UPGRADE {
            settings::strip_required_version(&self.stack.path.join(file))?;
        }
        settings::pin_required_version(
            &self.stack.path.join(settings::VERSIONS_FILE),
            &constraint,
        )?;
        log::info!("{}: upgrading to terraform {}", self.stack.name, next);

        let result = command.execute_with(&binary, self.runner, false)?;
        if result.success()
            && let Some(legacy) = &self.stack.legacy_config
            && legacy.exists()
        {
            fs::remove_file(legacy).map_err(|e| Error::io(legacy, e))?;
            log::info!("Removed {}", legacy.display());
        }
        Ok(result)
    }

    /// Read the saved plan file through `show`.
    ///
    /// # Errors
    ///
    /// `Error::PlanRead` when `show` exits non-zero.
    pub fn show_plan(&self) -> Result<PlanFile> {
        let mut options = self.stack.options_for(Subcommand::Show);
        let colorless = options
            .environment
            .get(CLI_ARGS_VAR)
            .is_some_and(|args| args.split_whitespace().any(|a| a == NO_COLOR));
        if !colorless {
            options.set("no-color", true);
        }
        // Only the plan text is wanted on stdout.
        options.echo = false;

        let plan_file = self.stack.plan_file();
        let result = self.run(Subcommand::Show, options, Some(&plan_file), true)?;
        if !result.success() {
            return Err(Error::PlanRead {
                path: self.stack.plan_path(),
                exit_code: result.exit_code,
                stderr: result.stderr().trim().to_string(),
            });
        }

        Ok(PlanFile::for_path(
            result.stdout(),
            self.revision.plan_format(),
            &self.stack.plan_path(),
        ))
    }

    /// Whether a saved plan file exists.
    #[must_use]
    pub fn planned(&self) -> bool {
        self.stack.plan_path().is_file()
    }

    /// Delete the saved plan file. Returns whether one existed.
    pub fn remove_plan_file(&self) -> Result<bool> {
        let path = self.stack.plan_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed plan file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn command(&self, subcommand: Subcommand, options: Options, target: Option<&str>) -> Command {
        let command = Command::new(subcommand, options).current_dir(&self.stack.path);
        match target {
            Some(target) => command.target(target),
            None => command,
        }
    }

    fn run(
        &self,
        subcommand: Subcommand,
        options: Options,
        target: Option<&str>,
        capture: bool,
    ) -> Result<ExecutionResult> {
        if !self.revision.supports(subcommand) {
            return Err(self.unsupported(subcommand.name()));
        }
        let command = self.command(subcommand, options, target);
        command.arguments()?;
        let binary = self.binary(&self.version)?;
        command.execute_with(&binary, self.runner, capture)
    }

    /// Path of the binary for `version`, installing it when allowed.
    fn binary(&self, version: &str) -> Result<String> {
        let path = if self.stack.options.autoinstall {
            self.manager.install(version)?
        } else {
            self.manager.seatbelt(Some(version))?;
            self.manager
                .get(version)
                .ok_or_else(|| self.manager.missing_error(Some(version)))?
        };
        Ok(path.display().to_string())
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::UnsupportedOperation {
            operation: operation.to_string(),
            revision: self.revision.id().to_string(),
        }
    }
}

impl std::fmt::Debug for Adapter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("revision", &self.revision.id())
            .field("version", &self.version)
            .field("stack", &self.stack.name)
            .finish()
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}
