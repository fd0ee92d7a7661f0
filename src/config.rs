//! Layered project configuration.
//!
//! Built-in defaults are overlaid by the project's `stackform.toml`, which is
//! in turn overlaid by an optional `stackform.toml` inside each stack
//! directory. Tables merge key by key; everything else, arrays included, is
//! replaced by the upper layer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tfkit::{CleanupRules, FlagValue, ManagerConfig, Options, Subcommand};

use crate::paths;

/// Name of the project and per-stack configuration files.
pub const PROJECT_FILE: &str = "stackform.toml";

const DEFAULTS: &str = r#"
base_folder = "stacks"

[terraform]
autoinstall = true
echo = false
quiet = true

[terraform.init]
lock = false
force_copy = true

[terraform.plan]
lock = false
parallelism = 5
detailed_exitcode = true

[terraform.apply]
parallelism = 5

[terraform.refresh]
input = false

[terraform.destroy]
parallelism = 5
auto_approve = true

[environment]
TF_PLUGIN_CACHE_DIR = "~/.terraform.d/plugins"

[misc]
disable_color = false

[cleanup]
empty = true
match = ["*.tfout", "*.tflock", "*.zip", ".terraform"]
"#;

/// The compiled configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Folder holding one directory per stack.
    pub base_folder: String,

    /// Engine settings and per-subcommand flags.
    #[serde(default)]
    pub terraform: TerraformConfig,

    /// Extra variables for every engine run.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub misc: MiscConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Merged layers, kept so a stack layer can be added on top.
    #[serde(skip)]
    table: toml::Table,

    /// Directory `base_folder` is relative to.
    #[serde(skip)]
    root: PathBuf,
}

/// The `[terraform]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub autoinstall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases_url: Option<String>,
    #[serde(default)]
    pub echo: bool,
    #[serde(default)]
    pub quiet: bool,
    /// Seconds before an engine run is killed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub init: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plan: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub apply: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refresh: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub destroy: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fmt: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub validate: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub show: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upgrade: BTreeMap<String, toml::Value>,
}

/// The `[misc]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiscConfig {
    #[serde(default)]
    pub disable_color: bool,
}

/// The `[cleanup]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub empty: bool,
    #[serde(default, rename = "match")]
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        let rules = CleanupRules::default();
        Self {
            empty: rules.empty,
            patterns: rules.patterns,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Defaults overlaid by the project file at `path`, when it exists.
    ///
    /// `base_folder` is resolved against the project file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut table = defaults_table()?;

        if path.exists() {
            log::debug!("Loading project config: {}", path.display());
            merge(&mut table, read_table(path)?);
        } else {
            log::debug!("No project config at {}, using defaults", path.display());
        }

        Self::from_table(table, &root)
    }

    /// This configuration overlaid by the stack's own `stackform.toml`.
    pub fn for_stack(&self, stack_dir: &Path) -> Result<Self> {
        let path = stack_dir.join(PROJECT_FILE);
        if !path.exists() {
            return Ok(self.clone());
        }
        log::debug!("Loading stack config: {}", path.display());
        let mut table = self.table.clone();
        merge(&mut table, read_table(&path)?);
        Self::from_table(table, &self.root)
    }

    fn from_table(table: toml::Table, root: &Path) -> Result<Self> {
        let mut config: Self = toml::Value::Table(table.clone())
            .try_into()
            .context("Invalid configuration")?;
        config.table = table;
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Directory holding the project file.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stacks folder.
    pub fn base_path(&self) -> PathBuf {
        self.root.join(&self.base_folder)
    }

    /// Install directory after `STACKFORM_INSTALL_DIR` and the config file.
    pub fn install_dir(&self) -> Option<PathBuf> {
        paths::install_dir_override()
            .or_else(|| self.terraform.install_dir.as_deref().map(paths::expand_path))
    }

    /// Version manager settings.
    pub fn manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new();
        if let Some(dir) = self.install_dir() {
            config = config.with_install_dir(dir);
        }
        if let Some(url) = &self.terraform.downloads_url {
            config = config.with_downloads_url(url);
        }
        if let Some(url) = &self.terraform.releases_url {
            config = config.with_releases_url(url);
        }
        config
    }

    /// Options shared by every subcommand.
    pub fn options(&self) -> Options {
        let terraform = &self.terraform;
        let mut options = Options::new();
        options.binary = terraform.binary.clone();
        options.version = terraform.version.clone();
        options.autoinstall = terraform.autoinstall;
        options.install_dir = self.install_dir();
        options.echo = terraform.echo;
        options.quiet = terraform.quiet;
        options.timeout = terraform.timeout.map(Duration::from_secs);
        options.environment = self.environment.clone();
        options
    }

    /// Per-subcommand flag overrides.
    pub fn overrides(&self) -> BTreeMap<Subcommand, BTreeMap<String, FlagValue>> {
        let t = &self.terraform;
        [
            (Subcommand::Init, &t.init),
            (Subcommand::Plan, &t.plan),
            (Subcommand::Apply, &t.apply),
            (Subcommand::Refresh, &t.refresh),
            (Subcommand::Destroy, &t.destroy),
            (Subcommand::Fmt, &t.fmt),
            (Subcommand::Validate, &t.validate),
            (Subcommand::Show, &t.show),
            (Subcommand::Upgrade, &t.upgrade),
        ]
        .into_iter()
        .filter(|(_, table)| !table.is_empty())
        .map(|(subcommand, table)| {
            let flags = table
                .iter()
                .map(|(key, value)| (key.clone(), flag_value(value)))
                .collect();
            (subcommand, flags)
        })
        .collect()
    }

    /// Cleanup rules.
    pub fn cleanup_rules(&self) -> CleanupRules {
        CleanupRules {
            empty: self.cleanup.empty,
            patterns: self.cleanup.patterns.clone(),
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

fn defaults_table() -> Result<toml::Table> {
    toml::from_str(DEFAULTS).context("Invalid built-in defaults")
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
}

/// Overlay `upper` onto `base`, recursing into tables.
fn merge(base: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn flag_value(value: &toml::Value) -> FlagValue {
    match value {
        toml::Value::Boolean(b) => FlagValue::Bool(*b),
        toml::Value::Integer(i) => FlagValue::Int(*i),
        toml::Value::String(s) => FlagValue::from(s.as_str()),
        other => FlagValue::from(other.to_string()),
    }
}
