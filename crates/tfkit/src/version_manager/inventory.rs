//! Installed engine binaries.

use crate::types::TOOL_NAME;
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BINARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^{}-(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)(?:\.exe)?$",
        TOOL_NAME
    ))
    .expect("inventory regex is valid")
});

/// Snapshot of the binaries in an install directory, sorted by version.
///
/// Built by scanning the directory; never cached, so it always reflects
/// the latest installs and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: Vec<(Version, PathBuf)>,
}

impl Inventory {
    /// Scan `dir`. A missing or unreadable directory is an empty inventory.
    #[must_use]
    pub fn scan(dir: &Path) -> Self {
        let read = match std::fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) => {
                log::debug!("No inventory at {}: {}", dir.display(), e);
                return Self::default();
            }
        };

        let mut entries: Vec<(Version, PathBuf)> = read
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file() || t.is_symlink()))
            .filter_map(|entry| {
                let name = entry.file_name();
                let caps = BINARY_RE.captures(name.to_str()?)?;
                let version = Version::parse(caps.get(1)?.as_str()).ok()?;
                Some((version, entry.path()))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        log::debug!("Found {} engine binaries in {}", entries.len(), dir.display());
        Self { entries }
    }

    /// Path of an installed version.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&Path> {
        let version = Version::parse(version.trim()).ok()?;
        self.entries
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, path)| path.as_path())
    }

    /// Whether `version` is installed.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_some()
    }

    /// Installed versions, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<Version> {
        self.entries.iter().map(|(v, _)| v.clone()).collect()
    }

    /// Highest installed version and its path.
    #[must_use]
    pub fn latest(&self) -> Option<(&Version, &Path)> {
        self.entries.last().map(|(v, p)| (v, p.as_path()))
    }

    /// Iterate `(version, path)` pairs, ascending.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Version, &Path)> {
        self.entries.iter().map(|(v, p)| (v, p.as_path()))
    }

    /// Number of installed binaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
