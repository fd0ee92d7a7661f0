//! Engine subcommands and argument compilation.
//!
//! Each [`Subcommand`] fixes a flag table (every flag it accepts, with its
//! default), the subset of flags that are switches, and the word passed to
//! the engine. A [`Command`] pairs a subcommand with [`Options`] and a target
//! and compiles them into an argument vector:
//!
//! 1. start from the flag table;
//! 2. overlay the caller's flags, rejecting any key the table lacks;
//! 3. drop flags whose value equals the default;
//! 4. render switches as `-key` when truthy (omitted otherwise) and
//!    everything else as `-key=value`.
//!
//! ```
//! use tfkit::{Command, Options, Subcommand};
//!
//! let options = Options::from_map([("lock", false), ("detailed_exitcode", true)]);
//! let command = Command::new(Subcommand::Plan, options).target("stacks/network");
//!
//! assert_eq!(command.arguments().unwrap(), vec!["-detailed-exitcode", "-lock=false"]);
//! assert_eq!(
//!     command.assemble("terraform").unwrap(),
//!     vec!["terraform", "plan", "-detailed-exitcode", "-lock=false", "stacks/network"],
//! );
//! ```

pub mod exec;
pub mod options;

use crate::error::{Error, Result};
use crate::types::ExecutionResult;
use crate::version_manager::{self, VersionManager};
use exec::{Invocation, ProcessRunner, Runner};
use options::{FlagValue, Options};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Variable pointing the engine at its per-stack state directory.
pub const DATA_DIR_VAR: &str = "TF_DATA_DIR";

/// Name of the per-stack state directory.
pub const DATA_DIR_NAME: &str = ".terraform";

/// Environment variables holding paths that are expanded before use.
pub const EXPANDED_VARS: &[&str] = &["TF_CLI_CONFIG_FILE", "TF_LOG_PATH", "TF_PLUGIN_CACHE_DIR"];

const T: FlagValue = FlagValue::Bool(true);
const F: FlagValue = FlagValue::Bool(false);
const NULL: FlagValue = FlagValue::Null;
const NO_LOCK_TIMEOUT: FlagValue = FlagValue::text("0s");
const STATE_FILE: FlagValue = FlagValue::text("terraform.tfstate");
const PARALLELISM: FlagValue = FlagValue::Int(10);
const ALL_MODULES: FlagValue = FlagValue::Int(-1);

const INIT_FLAGS: &[(&str, FlagValue)] = &[
    ("backend", T),
    ("backend-config", NULL),
    ("from-module", NULL),
    ("get", T),
    ("get-plugins", T),
    ("input", T),
    ("lock", T),
    ("lock-timeout", NO_LOCK_TIMEOUT),
    ("plugin-dir", NULL),
    ("upgrade", F),
    ("verify-plugins", T),
    ("no-color", F),
    ("force-copy", F),
    ("reconfigure", F),
];

const PLAN_FLAGS: &[(&str, FlagValue)] = &[
    ("destroy", F),
    ("detailed-exitcode", F),
    ("input", T),
    ("lock", T),
    ("lock-timeout", NO_LOCK_TIMEOUT),
    ("module-depth", ALL_MODULES),
    ("no-color", T),
    ("out", NULL),
    ("parallelism", PARALLELISM),
    ("refresh", T),
    ("state", STATE_FILE),
    ("var-file", NULL),
];

const APPLY_FLAGS: &[(&str, FlagValue)] = &[
    ("backup", NULL),
    ("auto-approve", F),
    ("lock", T),
    ("lock-timeout", NO_LOCK_TIMEOUT),
    ("input", T),
    ("no-color", T),
    ("parallelism", PARALLELISM),
    ("refresh", T),
    ("state", STATE_FILE),
    ("state-out", NULL),
    ("var-file", NULL),
];

const DESTROY_FLAGS: &[(&str, FlagValue)] = &[
    ("backup", NULL),
    ("auto-approve", F),
    ("force", F),
    ("lock", T),
    ("lock-timeout", NO_LOCK_TIMEOUT),
    ("no-color", T),
    ("parallelism", PARALLELISM),
    ("refresh", T),
    ("state", STATE_FILE),
    ("state-out", NULL),
    ("var-file", NULL),
];

const REFRESH_FLAGS: &[(&str, FlagValue)] = &[
    ("backup", NULL),
    ("input", T),
    ("lock", T),
    ("lock-timeout", NO_LOCK_TIMEOUT),
    ("no-color", T),
    ("state", STATE_FILE),
    ("state-out", NULL),
    ("var-file", NULL),
];

const FMT_FLAGS: &[(&str, FlagValue)] = &[
    ("list", T),
    ("write", T),
    ("diff", F),
    ("check", F),
];

const VALIDATE_FLAGS: &[(&str, FlagValue)] = &[
    ("check-variables", T),
    ("json", F),
    ("no-color", F),
    ("var-file", NULL),
];

const SHOW_FLAGS: &[(&str, FlagValue)] = &[("module-depth", ALL_MODULES), ("no-color", F)];

const UPGRADE_FLAGS: &[(&str, FlagValue)] = &[("yes", F)];

/// Engine subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subcommand {
    /// `init`
    Init,
    /// `plan`
    Plan,
    /// `apply`
    Apply,
    /// `refresh`
    Refresh,
    /// `destroy`
    Destroy,
    /// `fmt`
    Fmt,
    /// `validate`
    Validate,
    /// `show`
    Show,
    /// `0.12upgrade` and friends; the word comes from the revision.
    Upgrade,
    /// `version` probe.
    Version,
}

impl Subcommand {
    /// Every subcommand.
    pub const ALL: &'static [Subcommand] = &[
        Self::Init,
        Self::Plan,
        Self::Apply,
        Self::Refresh,
        Self::Destroy,
        Self::Fmt,
        Self::Validate,
        Self::Show,
        Self::Upgrade,
        Self::Version,
    ];

    /// Lowercase name, also the default engine word.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Destroy => "destroy",
            Self::Fmt => "fmt",
            Self::Validate => "validate",
            Self::Show => "show",
            Self::Upgrade => "upgrade",
            Self::Version => "version",
        }
    }

    /// Accepted flags and their defaults, in rendering order.
    #[must_use]
    pub fn defaults(&self) -> &'static [(&'static str, FlagValue)] {
        match self {
            Self::Init => INIT_FLAGS,
            Self::Plan => PLAN_FLAGS,
            Self::Apply => APPLY_FLAGS,
            Self::Refresh => REFRESH_FLAGS,
            Self::Destroy => DESTROY_FLAGS,
            Self::Fmt => FMT_FLAGS,
            Self::Validate => VALIDATE_FLAGS,
            Self::Show => SHOW_FLAGS,
            Self::Upgrade => UPGRADE_FLAGS,
            Self::Version => &[],
        }
    }

    /// Flags rendered bare (`-key`) rather than `-key=value`.
    #[must_use]
    pub fn switches(&self) -> &'static [&'static str] {
        match self {
            Self::Init => &["no-color", "force-copy", "reconfigure"],
            Self::Plan => &["destroy", "detailed-exitcode", "no-color"],
            Self::Apply => &["auto-approve", "no-color"],
            Self::Destroy => &["auto-approve", "force", "no-color"],
            Self::Refresh | Self::Show => &["no-color"],
            Self::Validate => &["json", "no-color"],
            Self::Upgrade => &["yes"],
            Self::Fmt | Self::Version => &[],
        }
    }

    /// Default for `key`, if the subcommand accepts it.
    #[must_use]
    pub fn default_for(&self, key: &str) -> Option<&'static FlagValue> {
        self.defaults()
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }

    /// Whether exit code 2 means "changes pending" rather than failure.
    #[must_use]
    pub fn uses_detailed_exit_code(&self) -> bool {
        matches!(self, Self::Plan)
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One compiled engine invocation.
#[derive(Debug, Clone)]
pub struct Command {
    subcommand: Subcommand,
    options: Options,
    target: Option<String>,
    word: Option<String>,
    current_dir: Option<PathBuf>,
}

impl Command {
    /// Command for `subcommand` with `options`.
    #[must_use]
    pub fn new(subcommand: Subcommand, options: Options) -> Self {
        Self {
            subcommand,
            options,
            target: None,
            word: None,
            current_dir: None,
        }
    }

    /// Directory or plan file passed as the final argument.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Working directory for the child process.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Override the engine word (`0.12upgrade` instead of `upgrade`).
    #[must_use]
    pub fn word(mut self, word: impl Into<String>) -> Self {
        self.word = Some(word.into());
        self
    }

    /// The subcommand.
    #[must_use]
    pub fn subcommand(&self) -> Subcommand {
        self.subcommand
    }

    /// The options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn engine_word(&self) -> &str {
        self.word.as_deref().unwrap_or(self.subcommand.name())
    }

    /// Compile the flag list.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` listing every key the subcommand does
    /// not accept.
    pub fn arguments(&self) -> Result<Vec<String>> {
        let defaults = self.subcommand.defaults();
        let supplied = self.options.flags();

        let unknown: Vec<String> = supplied
            .keys()
            .filter(|key| self.subcommand.default_for(key).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Configuration {
                subcommand: self.subcommand.name().to_string(),
                keys: unknown,
            });
        }

        let switches = self.subcommand.switches();
        let mut flags = Vec::new();
        for (key, default) in defaults {
            let Some(value) = supplied.get(*key) else {
                continue;
            };
            if value == default {
                continue;
            }
            if switches.contains(key) {
                if value.is_truthy() {
                    flags.push(format!("-{}", key));
                }
            } else {
                flags.push(format!("-{}={}", key, value.render()));
            }
        }

        log::debug!("{} flags: {:?}", self.subcommand, flags);
        Ok(flags)
    }

    /// Full argument vector for `binary`, with empty elements dropped.
    pub fn assemble(&self, binary: &str) -> Result<Vec<String>> {
        let flags = self.arguments()?;
        let argv = std::iter::once(binary.to_string())
            .chain(std::iter::once(self.engine_word().to_string()))
            .chain(flags)
            .chain(self.target.clone())
            .filter(|arg| !arg.is_empty())
            .collect();
        Ok(argv)
    }

    /// Directory the command applies to: the target if it is a directory,
    /// else the target's parent, resolved against the working directory.
    #[must_use]
    pub fn target_dir(&self) -> PathBuf {
        let base = self
            .current_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let target = match &self.target {
            Some(t) => base.join(t),
            None => base,
        };
        let dir = if target.is_dir() {
            target
        } else {
            target
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or(target)
        };
        std::path::absolute(&dir).unwrap_or(dir)
    }

    /// Variables added to the child environment.
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            DATA_DIR_VAR.to_string(),
            self.target_dir().join(DATA_DIR_NAME).display().to_string(),
        );
        for (key, value) in &self.options.environment {
            let value = if EXPANDED_VARS.contains(&key.as_str()) {
                expand_path(value)
            } else {
                value.clone()
            };
            env.insert(key.clone(), value);
        }
        env
    }

    /// Resolve the binary, then run it.
    ///
    /// Flags are compiled before anything else, so a configuration error
    /// never installs, resolves or spawns anything.
    pub fn execute(
        &self,
        manager: &VersionManager,
        runner: &dyn Runner,
        capture: bool,
    ) -> Result<ExecutionResult> {
        self.arguments()?;
        let binary = self.resolve_binary(manager)?;
        self.execute_with(&binary, runner, capture)
    }

    /// Run with an already resolved binary.
    pub fn execute_with(
        &self,
        binary: &str,
        runner: &dyn Runner,
        capture: bool,
    ) -> Result<ExecutionResult> {
        let argv = self.assemble(binary)?;
        if self.options.echo {
            println!("{}", argv.join(" "));
        }

        let (program, args) = match argv.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (binary.to_string(), Vec::new()),
        };

        let invocation = Invocation {
            program,
            args,
            cwd: self.current_dir.clone(),
            env: self.environment(),
            capture,
            quiet: self.options.quiet,
            timeout: self.options.timeout,
            cancel: self.options.cancel.clone(),
        };
        runner.run(&invocation)
    }

    fn resolve_binary(&self, manager: &VersionManager) -> Result<String> {
        let relocated;
        let manager = match &self.options.install_dir {
            Some(dir) => {
                relocated = manager.relocated(dir);
                &relocated
            }
            None => manager,
        };

        if let Some(constraint) = &self.options.version {
            let version = manager.resolve(constraint)?;
            let path = if self.options.autoinstall {
                manager.install(&version)?
            } else {
                manager.seatbelt(Some(&version))?;
                manager
                    .get(&version)
                    .ok_or_else(|| manager.missing_error(Some(&version)))?
            };
            return Ok(path.display().to_string());
        }

        if let Some(binary) = &self.options.binary {
            return Ok(binary.clone());
        }

        Ok(manager.search())
    }
}

/// Construct and execute in one call, using the process-wide manager
/// configuration and a real process runner.
pub fn execute(
    subcommand: Subcommand,
    options: Options,
    target: Option<&str>,
    capture: bool,
) -> Result<ExecutionResult> {
    let manager = VersionManager::new(version_manager::global::config());

    let mut command = Command::new(subcommand, options);
    if let Some(target) = target {
        command = command.target(target);
    }
    command.execute(&manager, &ProcessRunner, capture)
}

fn expand_path(value: &str) -> String {
    let expanded = shellexpand::full(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string());
    let path = PathBuf::from(&expanded);
    std::path::absolute(&path)
        .map(|p| p.display().to_string())
        .unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockTransport;
    use crate::commands::exec::RecordingRunner;
    use crate::version_manager::ManagerConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn offline_manager(dir: &Path) -> (VersionManager, MockTransport) {
        let mock = MockTransport::new();
        let config = ManagerConfig::new().with_install_dir(dir);
        (VersionManager::with_transport(config, Arc::new(mock.clone())), mock)
    }

    #[test]
    fn test_defaults_compile_to_no_flags() {
        for subcommand in Subcommand::ALL {
            let options = Options::from_map(
                subcommand
                    .defaults()
                    .iter()
                    .map(|(key, value)| (*key, value.clone())),
            );
            let command = Command::new(*subcommand, options);
            assert!(
                command.arguments().unwrap().is_empty(),
                "{} should compile defaults to nothing",
                subcommand
            );
        }
    }

    #[test]
    fn test_unknown_key_never_spawns() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = offline_manager(tmp.path());

        for subcommand in Subcommand::ALL {
            let runner = RecordingRunner::new();
            let mut options = Options::new();
            options.set("bogus", true).set("version", "~> 1.4.0");
            let command = Command::new(*subcommand, options);

            match command.execute(&manager, &runner, false) {
                Err(Error::Configuration { subcommand: name, keys }) => {
                    assert_eq!(name, subcommand.name());
                    assert_eq!(keys, vec!["bogus".to_string()]);
                }
                other => panic!("expected configuration error, got {:?}", other),
            }
            assert_eq!(runner.calls(), 0);
        }
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_unknown_keys_are_sorted() {
        let options = Options::from_map([("zeta", 1), ("alpha", 2)]);
        match Command::new(Subcommand::Fmt, options).arguments() {
            Err(Error::Configuration { keys, .. }) => assert_eq!(keys, vec!["alpha", "zeta"]),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_rendering() {
        let options = Options::from_map([("no_color", false), ("destroy", true)]);
        let command = Command::new(Subcommand::Plan, options);
        assert_eq!(command.arguments().unwrap(), vec!["-destroy"]);

        let options = Options::from_map([("force_copy", true), ("reconfigure", false)]);
        let command = Command::new(Subcommand::Init, options);
        assert_eq!(command.arguments().unwrap(), vec!["-force-copy"]);
    }

    #[test]
    fn test_value_rendering_follows_table_order() {
        let options = Options::from_map([
            ("state", FlagValue::from("custom.tfstate")),
            ("parallelism", FlagValue::Int(5)),
            ("lock", FlagValue::Bool(false)),
            ("out", FlagValue::from("network.tfout")),
        ]);
        let command = Command::new(Subcommand::Plan, options);
        assert_eq!(
            command.arguments().unwrap(),
            vec![
                "-lock=false",
                "-out=network.tfout",
                "-parallelism=5",
                "-state=custom.tfstate"
            ]
        );
    }

    #[test]
    fn test_assemble_drops_empty_elements() {
        let command = Command::new(Subcommand::Version, Options::new());
        assert_eq!(command.assemble("terraform").unwrap(), vec!["terraform", "version"]);

        let command = Command::new(Subcommand::Upgrade, Options::from_map([("yes", true)]))
            .word("0.12upgrade")
            .target("");
        assert_eq!(
            command.assemble("/bin/tf").unwrap(),
            vec!["/bin/tf", "0.12upgrade", "-yes"]
        );
    }

    #[test]
    fn test_environment_sets_data_dir() {
        let tmp = TempDir::new().unwrap();
        let stack = tmp.path().join("network");
        std::fs::create_dir(&stack).unwrap();

        let command = Command::new(Subcommand::Init, Options::new())
            .current_dir(tmp.path())
            .target("network");
        let env = command.environment();
        assert_eq!(
            env.get(DATA_DIR_VAR).unwrap(),
            &stack.join(".terraform").display().to_string()
        );
    }

    #[test]
    fn test_environment_plan_file_target_uses_parent() {
        let tmp = TempDir::new().unwrap();
        let command = Command::new(Subcommand::Show, Options::new())
            .current_dir(tmp.path())
            .target("network.tfout");
        assert_eq!(command.target_dir(), tmp.path());
    }

    #[test]
    fn test_environment_overlay_and_expansion() {
        let mut options = Options::new();
        options
            .env("TF_PLUGIN_CACHE_DIR", "~/.terraform.d/plugins")
            .env("TF_IN_AUTOMATION", "1");
        let command = Command::new(Subcommand::Init, options);
        let env = command.environment();

        assert_eq!(env.get("TF_IN_AUTOMATION").unwrap(), "1");
        let cache = env.get("TF_PLUGIN_CACHE_DIR").unwrap();
        assert!(!cache.starts_with('~'));
        assert!(cache.ends_with(".terraform.d/plugins"));
    }

    #[test]
    fn test_execute_uses_binary_and_cwd() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = offline_manager(tmp.path());
        let runner = RecordingRunner::new();
        runner.push(ExecutionResult::captured(2, "+ null_resource.x", ""));

        let mut options = Options::new();
        options.binary = Some("/usr/bin/terraform".to_string());
        options.quiet = true;
        options.set("detailed_exitcode", true);

        let result = Command::new(Subcommand::Plan, options)
            .current_dir(tmp.path())
            .execute(&manager, &runner, true)
            .unwrap();

        assert_eq!(result.exit_code, 2);
        let invocation = runner.last().unwrap();
        assert_eq!(invocation.program, "/usr/bin/terraform");
        assert_eq!(invocation.args, vec!["plan", "-detailed-exitcode"]);
        assert_eq!(invocation.cwd.as_deref(), Some(tmp.path()));
        assert!(invocation.capture);
        assert!(invocation.quiet);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_execute_resolves_installed_version() {
        let tmp = TempDir::new().unwrap();
        let binary = tmp.path().join("terraform-1.4.2");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        let (manager, mock) = offline_manager(tmp.path());
        mock.add(format!("{}/", manager.config().releases_url()), "");
        let runner = RecordingRunner::new();

        let mut options = Options::new();
        options.version = Some("= 1.4.2".to_string());
        Command::new(Subcommand::Validate, options)
            .execute(&manager, &runner, false)
            .unwrap();

        assert_eq!(runner.last().unwrap().program, binary.display().to_string());
    }

    #[test]
    fn test_execute_missing_version_without_autoinstall() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("terraform-1.4.2"), "").unwrap();
        let (manager, mock) = offline_manager(tmp.path());
        mock.add(
            format!("{}/", manager.config().releases_url()),
            r#"<a href="/terraform/1.5.7/">terraform_1.5.7</a>"#,
        );
        let runner = RecordingRunner::new();

        let mut options = Options::new();
        options.version = Some("= 1.5.7".to_string());
        let result = Command::new(Subcommand::Plan, options).execute(&manager, &runner, false);

        assert!(matches!(result, Err(Error::VersionMismatch { .. })));
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn test_execute_honours_install_dir_option() {
        let default_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        let binary = other_dir.path().join("terraform-1.4.2");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        let (manager, _mock) = offline_manager(default_dir.path());
        let runner = RecordingRunner::new();

        let mut options = Options::new();
        options.version = Some("= 1.4.2".to_string());
        options.install_dir = Some(other_dir.path().to_path_buf());
        Command::new(Subcommand::Validate, options)
            .execute(&manager, &runner, false)
            .unwrap();

        assert_eq!(runner.last().unwrap().program, binary.display().to_string());
    }

    #[test]
    fn test_execute_searches_install_dir_option() {
        let default_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        std::fs::write(default_dir.path().join("terraform-1.5.7"), "").unwrap();
        std::fs::write(other_dir.path().join("terraform-1.4.2"), "").unwrap();
        let (manager, mock) = offline_manager(default_dir.path());
        let runner = RecordingRunner::new();

        let mut options = Options::new();
        options.install_dir = Some(other_dir.path().to_path_buf());
        Command::new(Subcommand::Validate, options)
            .execute(&manager, &runner, false)
            .unwrap();

        assert_eq!(
            runner.last().unwrap().program,
            other_dir.path().join("terraform-1.4.2").display().to_string()
        );
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_detailed_exit_code_only_for_plan() {
        for subcommand in Subcommand::ALL {
            assert_eq!(
                subcommand.uses_detailed_exit_code(),
                *subcommand == Subcommand::Plan
            );
        }
    }

    #[test]
    fn test_switches_are_in_defaults() {
        for subcommand in Subcommand::ALL {
            for switch in subcommand.switches() {
                assert!(subcommand.default_for(switch).is_some());
            }
        }
    }
}
