//! Version manager configuration.
//!
//! The install directory and release endpoints are an explicit value handed
//! to [`super::VersionManager::new`]. Setters are lenient the same way the
//! project config is: a directory that does not exist or a URL that is not
//! http(s) falls back to the default with a warning instead of failing.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default page scraped for the newest published version.
pub const DEFAULT_DOWNLOADS_URL: &str = "https://www.terraform.io/downloads.html";

/// Default base URL for release archives and checksum manifests.
pub const DEFAULT_RELEASES_URL: &str = "https://releases.hashicorp.com/terraform";

/// Configuration for a [`super::VersionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    install_dir: PathBuf,
    downloads_url: String,
    releases_url: String,
    timeout: Option<Duration>,
}

impl ManagerConfig {
    /// Configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            install_dir: default_install_dir(),
            downloads_url: DEFAULT_DOWNLOADS_URL.to_string(),
            releases_url: DEFAULT_RELEASES_URL.to_string(),
            timeout: None,
        }
    }

    /// Directory holding `terraform-<version>` binaries.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Page scraped by [`super::VersionManager::latest`].
    #[must_use]
    pub fn downloads_url(&self) -> &str {
        &self.downloads_url
    }

    /// Base URL for archives, manifests and the release index.
    #[must_use]
    pub fn releases_url(&self) -> &str {
        &self.releases_url
    }

    /// Deadline applied to each HTTP request.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the install directory.
    ///
    /// `~` is expanded. Empty values and directories that do not exist reset
    /// to the default.
    #[must_use]
    pub fn with_install_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.install_dir = validate_path(dir.as_ref()).unwrap_or_else(default_install_dir);
        self
    }

    /// Set the downloads page URL. Non-http(s) values reset to the default.
    #[must_use]
    pub fn with_downloads_url(mut self, url: &str) -> Self {
        self.downloads_url =
            validate_url(url).unwrap_or_else(|| DEFAULT_DOWNLOADS_URL.to_string());
        self
    }

    /// Set the releases base URL. Non-http(s) values reset to the default.
    #[must_use]
    pub fn with_releases_url(mut self, url: &str) -> Self {
        self.releases_url = validate_url(url).unwrap_or_else(|| DEFAULT_RELEASES_URL.to_string());
        self
    }

    /// Set the per-request HTTP deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Default install directory: `~/.local/bin`, or `/usr/local/bin` without a home.
#[must_use]
pub fn default_install_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".local").join("bin"))
        .unwrap_or_else(|| PathBuf::from("/usr/local/bin"))
}

fn validate_path(dir: &Path) -> Option<PathBuf> {
    let raw = dir.to_string_lossy();
    if raw.trim().is_empty() {
        return None;
    }

    let expanded = PathBuf::from(shellexpand::tilde(&raw).as_ref());
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().ok()?.join(expanded)
    };

    if absolute.is_dir() {
        Some(absolute)
    } else {
        log::warn!(
            "Install directory {} does not exist, using default",
            absolute.display()
        );
        None
    }
}

fn validate_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.trim_end_matches('/').to_string())
    } else {
        log::warn!("Ignoring non-http(s) URL: {}", url);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.downloads_url(), DEFAULT_DOWNLOADS_URL);
        assert_eq!(config.releases_url(), DEFAULT_RELEASES_URL);
        assert_eq!(config.install_dir(), default_install_dir());
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_default_install_dir_contains_bin() {
        let dir = default_install_dir();
        assert!(dir.to_string_lossy().contains("bin"));
    }

    #[test]
    fn test_existing_install_dir_is_kept() {
        let tmp = TempDir::new().unwrap();
        let config = ManagerConfig::new().with_install_dir(tmp.path());
        assert_eq!(config.install_dir(), tmp.path());
    }

    #[test]
    fn test_missing_install_dir_falls_back() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let config = ManagerConfig::new().with_install_dir(&missing);
        assert_eq!(config.install_dir(), default_install_dir());
    }

    #[test]
    fn test_empty_install_dir_falls_back() {
        let config = ManagerConfig::new().with_install_dir("");
        assert_eq!(config.install_dir(), default_install_dir());
    }

    #[test]
    fn test_urls_validated() {
        let config = ManagerConfig::new()
            .with_releases_url("https://mirror.example.com/terraform/")
            .with_downloads_url("ftp://example.com");
        assert_eq!(config.releases_url(), "https://mirror.example.com/terraform");
        assert_eq!(config.downloads_url(), DEFAULT_DOWNLOADS_URL);
    }

    #[test]
    fn test_reset_by_rebuilding() {
        let tmp = TempDir::new().unwrap();
        let config = ManagerConfig::new()
            .with_install_dir(tmp.path())
            .with_timeout(Some(Duration::from_secs(3)));
        assert_ne!(config, ManagerConfig::default());
        assert_eq!(ManagerConfig::new(), ManagerConfig::default());
    }
}
