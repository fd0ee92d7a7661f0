//! Per-invocation options.
//!
//! [`Options`] carries the universal fields every engine invocation
//! understands as typed fields, plus an open map of command-specific flags
//! (`state`, `out`, `lock`, `parallelism`, ...). The open map is validated
//! against the subcommand's flag table only when arguments are compiled, so
//! callers can stage keys before they know which subcommand will run.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Shared flag a caller sets to stop a running engine process.
pub type CancellationToken = Arc<AtomicBool>;

/// Create an unset cancellation token.
#[must_use]
pub fn cancellation_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Whether `token` has been tripped.
#[must_use]
pub fn is_cancelled(token: &CancellationToken) -> bool {
    token.load(Ordering::Relaxed)
}

/// Value of a command flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer flag (`parallelism`, `module-depth`).
    Int(i64),
    /// String flag (`state`, `lock-timeout`).
    Str(Cow<'static, str>),
    /// Unset; rendered as an empty value if it survives compilation.
    Null,
}

impl FlagValue {
    /// Static string value, usable in flag tables.
    #[must_use]
    pub const fn text(value: &'static str) -> Self {
        Self::Str(Cow::Borrowed(value))
    }

    /// Truthiness used for switches: only `false` and `Null` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Bool(false) | Self::Null)
    }

    /// Value as it appears after `-key=`.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => s.to_string(),
            Self::Null => String::new(),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Str(Cow::Owned(value.to_string()))
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        Self::Str(Cow::Owned(value))
    }
}

impl<T: Into<FlagValue>> From<Option<T>> for FlagValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Options for one engine invocation.
///
/// ```
/// use tfkit::{FlagValue, Options};
///
/// let mut options = Options::new();
/// options.set("parallelism", 5);
/// options.set("detailed_exitcode", true);
///
/// assert_eq!(options.get("parallelism"), Some(FlagValue::Int(5)));
/// assert_eq!(options.get("detailed-exitcode"), Some(FlagValue::Bool(true)));
/// assert_eq!(options.get("nonexistent"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Engine binary path or bare command name; resolved when unset.
    pub binary: Option<String>,
    /// Version constraint; `None` means whatever is resolvable.
    pub version: Option<String>,
    /// Install the resolved version on demand.
    pub autoinstall: bool,
    /// Install directory override; `None` uses the manager's.
    pub install_dir: Option<PathBuf>,
    /// Print the assembled argument vector before running.
    pub echo: bool,
    /// Suppress streamed stdout. Stderr is never suppressed.
    pub quiet: bool,
    /// Extra variables for the child environment.
    pub environment: BTreeMap<String, String>,
    /// Kill the engine after this long.
    pub timeout: Option<Duration>,
    /// Kill the engine when this token trips.
    pub cancel: Option<CancellationToken>,
    args: BTreeMap<String, FlagValue>,
}

impl Options {
    /// Options with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options built from a map of overrides.
    pub fn from_map<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FlagValue>,
    {
        let mut options = Self::new();
        options.merge(overrides);
        options
    }

    /// Read any field. Unknown keys read as `None`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<FlagValue> {
        match universal_key(key) {
            Some("binary") => self.binary.clone().map(FlagValue::from),
            Some("version") => self.version.clone().map(FlagValue::from),
            Some("autoinstall") => Some(FlagValue::Bool(self.autoinstall)),
            Some("install_dir") => self
                .install_dir
                .as_ref()
                .map(|p| FlagValue::from(p.display().to_string())),
            Some("echo") => Some(FlagValue::Bool(self.echo)),
            Some("quiet") => Some(FlagValue::Bool(self.quiet)),
            _ => self.args.get(&flag_key(key)).cloned(),
        }
    }

    /// Write any field.
    ///
    /// Universal keys update the typed fields; everything else lands in the
    /// command flag map with underscores normalized to hyphens.
    pub fn set(&mut self, key: &str, value: impl Into<FlagValue>) -> &mut Self {
        let value = value.into();
        match universal_key(key) {
            Some("binary") => self.binary = optional_text(&value),
            Some("version") => self.version = optional_text(&value),
            Some("autoinstall") => self.autoinstall = value.is_truthy(),
            Some("install_dir") => self.install_dir = optional_text(&value).map(PathBuf::from),
            Some("echo") => self.echo = value.is_truthy(),
            Some("quiet") => self.quiet = value.is_truthy(),
            _ => {
                self.args.insert(flag_key(key), value);
            }
        }
        self
    }

    /// Remove a command flag.
    pub fn unset(&mut self, key: &str) -> Option<FlagValue> {
        self.args.remove(&flag_key(key))
    }

    /// Merge overrides in; fields they do not mention are kept.
    pub fn merge<I, K, V>(&mut self, overrides: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FlagValue>,
    {
        for (key, value) in overrides {
            self.set(key.as_ref(), value);
        }
        self
    }

    /// Add one variable to the child environment.
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Command-specific flags, keyed by their hyphenated names.
    #[must_use]
    pub fn flags(&self) -> &BTreeMap<String, FlagValue> {
        &self.args
    }
}

fn universal_key(key: &str) -> Option<&'static str> {
    match key.replace('-', "_").as_str() {
        "binary" => Some("binary"),
        "version" => Some("version"),
        "autoinstall" => Some("autoinstall"),
        "install_dir" => Some("install_dir"),
        "echo" => Some("echo"),
        "quiet" => Some("quiet"),
        _ => None,
    }
}

fn flag_key(key: &str) -> String {
    key.replace('_', "-")
}

fn optional_text(value: &FlagValue) -> Option<String> {
    match value {
        FlagValue::Null => None,
        other => Some(other.render()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::new();
        assert!(options.binary.is_none());
        assert!(options.version.is_none());
        assert!(!options.autoinstall);
        assert!(options.install_dir.is_none());
        assert!(!options.echo);
        assert!(!options.quiet);
        assert!(options.environment.is_empty());
        assert!(options.flags().is_empty());
    }

    #[test]
    fn test_unknown_fields_read_as_absent() {
        let options = Options::new();
        assert_eq!(options.get("refresh"), None);
        assert_eq!(options.get("version"), None);
        assert_eq!(options.get("quiet"), Some(FlagValue::Bool(false)));
    }

    #[test]
    fn test_universal_keys_set_typed_fields() {
        let mut options = Options::new();
        options
            .set("version", "~> 1.4.0")
            .set("autoinstall", true)
            .set("install-dir", "/opt/tf")
            .set("echo", true);

        assert_eq!(options.version.as_deref(), Some("~> 1.4.0"));
        assert!(options.autoinstall);
        assert_eq!(options.install_dir, Some(PathBuf::from("/opt/tf")));
        assert!(options.echo);
        assert!(options.flags().is_empty());
    }

    #[test]
    fn test_flag_keys_are_hyphenated() {
        let mut options = Options::new();
        options.set("force_copy", true);
        assert_eq!(options.get("force-copy"), Some(FlagValue::Bool(true)));
        assert!(options.flags().contains_key("force-copy"));
        assert_eq!(options.unset("force_copy"), Some(FlagValue::Bool(true)));
        assert!(options.flags().is_empty());
    }

    #[test]
    fn test_merge_keeps_unmentioned_fields() {
        let mut options = Options::from_map([("state", "a.tfstate"), ("lock-timeout", "5s")]);
        options.merge([("state", "b.tfstate")]);
        assert_eq!(options.get("state"), Some(FlagValue::from("b.tfstate")));
        assert_eq!(options.get("lock_timeout"), Some(FlagValue::from("5s")));
    }

    #[test]
    fn test_null_clears_typed_field() {
        let mut options = Options::new();
        options.set("version", "1.4.2");
        options.set("version", FlagValue::Null);
        assert!(options.version.is_none());
    }

    #[test]
    fn test_flag_value_truthiness() {
        assert!(FlagValue::Bool(true).is_truthy());
        assert!(!FlagValue::Bool(false).is_truthy());
        assert!(!FlagValue::Null.is_truthy());
        assert!(FlagValue::Int(0).is_truthy());
        assert!(FlagValue::text("").is_truthy());
    }

    #[test]
    fn test_flag_value_render() {
        assert_eq!(FlagValue::Int(-1).render(), "-1");
        assert_eq!(FlagValue::Bool(false).to_string(), "false");
        assert_eq!(FlagValue::Null.render(), "");
        assert_eq!(FlagValue::from(None::<&str>), FlagValue::Null);
        assert_eq!(FlagValue::from(Some(3)), FlagValue::Int(3));
    }

    #[test]
    fn test_cancellation_token() {
        let token = cancellation_token();
        assert!(!is_cancelled(&token));
        token.store(true, Ordering::Relaxed);
        assert!(is_cancelled(&token));
    }
}
