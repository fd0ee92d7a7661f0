//! Resolving, installing and checking engine versions.
//!
//! A [`VersionManager`] owns an install directory full of
//! `terraform-<version>` binaries and knows where releases are published.
//! Network access goes through a [`Transport`], so everything here can be
//! exercised offline with [`crate::backend::MockTransport`].
//!
//! # Example
//!
//! ```no_run
//! use tfkit::{ManagerConfig, VersionManager};
//!
//! let manager = VersionManager::new(ManagerConfig::new().with_install_dir("~/.local/bin"));
//! let version = manager.resolve("~> 1.4.0")?;
//! let binary = manager.install(&version)?;
//! manager.seatbelt(Some(&version))?;
//! println!("{} -> {}", version, binary.display());
//! # Ok::<(), tfkit::Error>(())
//! ```

pub mod config;
pub mod constraint;
pub mod downloader;
pub mod global;
pub mod installer;
pub mod inventory;

pub use config::{DEFAULT_DOWNLOADS_URL, DEFAULT_RELEASES_URL, ManagerConfig};
pub use constraint::Constraint;
pub use inventory::Inventory;

use crate::backend::Transport;
use crate::backend::http::HttpTransport;
use crate::error::{Error, Result};
use crate::platform;
use crate::types::{Platform, TOOL_NAME};
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// Oldest engine version this crate drives.
pub const MIN_VERSION: &str = "0.11.10";

/// Keyword `resolve` maps to the newest published release.
pub const LATEST: &str = "latest";

static RELEASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{}_(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)",
        TOOL_NAME
    ))
    .expect("release regex is valid")
});

/// Engine version manager.
pub struct VersionManager {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    platform: Option<Platform>,
}

impl VersionManager {
    /// Manager talking to the configured endpoints over HTTPS.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.timeout()));
        Self::with_transport(config, transport)
    }

    /// Manager with a custom transport (mirrors, tests).
    #[must_use]
    pub fn with_transport(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            platform: None,
        }
    }

    /// Download archives for `platform` instead of the host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// The same manager pointed at another install directory.
    #[must_use]
    pub fn relocated(&self, dir: impl AsRef<Path>) -> Self {
        Self {
            config: self.config.clone().with_install_dir(dir),
            transport: Arc::clone(&self.transport),
            platform: self.platform.clone(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Target platform for downloads.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedPlatform` when the host has no published
    /// archive and no platform was set explicitly.
    pub fn platform(&self) -> Result<Platform> {
        match &self.platform {
            Some(platform) => Ok(platform.clone()),
            None => platform::detect(),
        }
    }

    /// Fresh scan of the install directory.
    #[must_use]
    pub fn inventory(&self) -> Inventory {
        Inventory::scan(self.config.install_dir())
    }

    /// Installed versions, ascending.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.inventory()
            .versions()
            .iter()
            .map(Version::to_string)
            .collect()
    }

    /// Path of an installed version.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<PathBuf> {
        self.inventory().get(version).map(PathBuf::from)
    }

    /// Where `version` is (or would be) installed.
    #[must_use]
    pub fn binary_path(&self, version: &str) -> PathBuf {
        self.config.install_dir().join(format!(
            "{}-{}{}",
            TOOL_NAME,
            version,
            platform::executable_extension()
        ))
    }

    /// Highest installed binary, or the bare tool name to look up on `PATH`.
    #[must_use]
    pub fn search(&self) -> String {
        self.inventory()
            .latest()
            .map(|(_, path)| path.display().to_string())
            .unwrap_or_else(|| TOOL_NAME.to_string())
    }

    /// Versions published on the release index, ascending.
    pub fn releases(&self) -> Result<Vec<Version>> {
        let url = format!("{}/", self.config.releases_url());
        let index = self.transport.get_text(&url)?;

        let mut versions: Vec<Version> = RELEASE_RE
            .captures_iter(&index)
            .filter_map(|caps| Version::parse(caps.get(1)?.as_str()).ok())
            .collect();
        versions.sort();
        versions.dedup();

        log::debug!("Release index lists {} versions", versions.len());
        Ok(versions)
    }

    /// Newest published stable version.
    ///
    /// Scrapes the downloads page for links into the release tree and falls
    /// back to the release index when the page yields nothing.
    pub fn latest(&self) -> Result<String> {
        match self.scrape_downloads_page() {
            Ok(Some(version)) => return Ok(version.to_string()),
            Ok(None) => log::debug!("No versions on {}", self.config.downloads_url()),
            Err(e) => log::warn!("Could not read {}: {}", self.config.downloads_url(), e),
        }

        self.releases()?
            .into_iter()
            .filter(|v| v.pre.is_empty())
            .max()
            .map(|v| v.to_string())
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "no versions found at {}",
                    self.config.releases_url()
                ))
            })
    }

    fn scrape_downloads_page(&self) -> Result<Option<Version>> {
        let page = self.transport.get_text(self.config.downloads_url())?;
        let pattern = format!(
            r"{}/(\d+\.\d+\.\d+)",
            regex::escape(self.config.releases_url())
        );
        let re = Regex::new(&pattern).map_err(|e| Error::Other(e.to_string()))?;

        Ok(re
            .captures_iter(&page)
            .filter_map(|caps| Version::parse(caps.get(1)?.as_str()).ok())
            .max())
    }

    /// Highest installed-or-published version satisfying `expr`.
    ///
    /// An exact constraint that is already installed resolves without
    /// network access. An unreachable release index is tolerated when the
    /// inventory alone satisfies the constraint. `latest` resolves to the
    /// newest published release.
    ///
    /// # Errors
    ///
    /// `Error::UnparsableConstraint` for malformed expressions and
    /// `Error::InvalidVersion` when nothing satisfies a well-formed one.
    pub fn resolve(&self, expr: &str) -> Result<String> {
        if expr.trim().eq_ignore_ascii_case(LATEST) {
            return self.latest();
        }

        let constraint = Constraint::parse(expr)?;
        let inventory = self.inventory();

        if let Some(exact) = constraint.exact()
            && inventory.contains(&exact.to_string())
        {
            log::debug!("{} is installed, skipping release index", exact);
            return Ok(exact.to_string());
        }

        let mut candidates = inventory.versions();
        match self.releases() {
            Ok(published) => candidates.extend(published),
            Err(e) => {
                if constraint.best_match(&candidates).is_none() {
                    return Err(e);
                }
                log::warn!("Release index unavailable, resolving from installed versions: {}", e);
            }
        }

        let resolved = constraint
            .best_match(&candidates)
            .map(Version::to_string)
            .ok_or_else(|| Error::InvalidVersion {
                constraint: constraint.to_string(),
            })?;

        log::debug!("Resolved `{}` to {}", constraint, resolved);
        Ok(resolved)
    }

    /// Install `version`, returning the binary path.
    ///
    /// Already installed versions return immediately without network access.
    /// Otherwise the archive is downloaded, verified against the published
    /// `SHA256SUMS` and unpacked. Temporary files are removed whatever the
    /// outcome; a failed install leaves no binary behind.
    pub fn install(&self, version: &str) -> Result<PathBuf> {
        let version = Version::parse(version.trim())
            .map_err(|_| Error::InvalidVersion {
                constraint: version.to_string(),
            })?
            .to_string();

        if let Some(path) = self.get(&version) {
            log::debug!("{} {} already installed at {}", TOOL_NAME, version, path.display());
            return Ok(path);
        }

        let platform = self.platform()?;
        let archive = platform.archive_name(&version);
        let base = format!("{}/{}", self.config.releases_url(), version);

        let manifest = self
            .transport
            .get_text(&format!("{}/{}_{}_SHA256SUMS", base, TOOL_NAME, version))?;
        let download = downloader::fetch(self.transport.as_ref(), &format!("{}/{}", base, archive))?;
        installer::verify(&manifest, &archive, &download)?;

        let install_dir = self.config.install_dir();
        std::fs::create_dir_all(install_dir).map_err(|e| Error::io(install_dir, e))?;

        let dest = self.binary_path(&version);
        let entry = format!(
            "{}{}",
            TOOL_NAME,
            if platform.is_windows() { ".exe" } else { "" }
        );
        installer::unpack(&download, &entry, &dest)?;

        log::info!("Installed {} {} to {}", TOOL_NAME, version, dest.display());
        Ok(dest)
    }

    /// Delete an installed version. Returns `false` when it was not installed.
    pub fn remove(&self, version: &str) -> Result<bool> {
        let Some(path) = self.get(version) else {
            log::debug!("{} {} not installed, nothing to remove", TOOL_NAME, version);
            return Ok(false);
        };

        std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        log::info!("Removed {} {}", TOOL_NAME, version);
        Ok(true)
    }

    /// Pre-flight check before running anything.
    ///
    /// # Errors
    ///
    /// `Error::NotInstalled` when nothing is installed, `Error::VersionMismatch`
    /// when no installed version meets [`MIN_VERSION`] or the requested
    /// version is missing.
    pub fn seatbelt(&self, version: Option<&str>) -> Result<()> {
        let inventory = self.inventory();
        if inventory.is_empty() {
            return Err(self.seatbelt_error(&inventory, version));
        }

        let minimum = Version::parse(MIN_VERSION).map_err(|e| Error::Other(e.to_string()))?;
        let meets_minimum = inventory.versions().iter().any(|v| *v >= minimum);
        let has_requested = version.is_none_or(|v| inventory.contains(v));

        if meets_minimum && has_requested {
            Ok(())
        } else {
            Err(self.seatbelt_error(&inventory, version))
        }
    }

    /// The seatbelt error for a version that could not be found.
    #[must_use]
    pub fn missing_error(&self, version: Option<&str>) -> Error {
        self.seatbelt_error(&self.inventory(), version)
    }

    fn seatbelt_error(&self, inventory: &Inventory, version: Option<&str>) -> Error {
        let minimum = MIN_VERSION.to_string();
        let required = version.map(str::to_string);
        if inventory.is_empty() {
            Error::NotInstalled { minimum, required }
        } else {
            Error::VersionMismatch { minimum, required }
        }
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockTransport;
    use crate::version_manager::downloader::sha256_hex;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    const RELEASES: &str = "https://releases.example.com/terraform";
    const DOWNLOADS: &str = "https://www.example.com/downloads.html";

    fn manager(dir: &Path) -> (VersionManager, MockTransport) {
        let mock = MockTransport::new();
        let config = ManagerConfig::new()
            .with_install_dir(dir)
            .with_releases_url(RELEASES)
            .with_downloads_url(DOWNLOADS);
        let manager = VersionManager::with_transport(config, Arc::new(mock.clone()))
            .with_platform(Platform::new("linux", "amd64"));
        (manager, mock)
    }

    fn release_zip(content: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file("terraform", options).unwrap();
            zip.write_all(content).unwrap();
            zip.finish().unwrap();
        }
        buffer
    }

    /// Publish `version` on the mock, returning the archive digest.
    fn publish(mock: &MockTransport, version: &str, archive: Vec<u8>, digest: Option<&str>) -> String {
        let name = format!("terraform_{}_linux_amd64.zip", version);
        let actual = sha256_hex(&archive);
        let manifest = format!(
            "{}  terraform_{}_darwin_amd64.zip\n{}  {}\n",
            "a".repeat(64),
            version,
            digest.unwrap_or(&actual),
            name
        );
        mock.add(format!("{}/{}/{}", RELEASES, version, name), archive);
        mock.add(
            format!("{}/{}/terraform_{}_SHA256SUMS", RELEASES, version, version),
            manifest,
        );
        actual
    }

    fn index(versions: &[&str]) -> String {
        versions
            .iter()
            .map(|v| format!("<li><a href=\"/terraform/{v}/\">terraform_{v}</a></li>\n"))
            .collect()
    }

    #[test]
    fn test_install_round_trip() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        let archive = release_zip(b"#!/bin/sh\necho v1.4.2\n");
        publish(&mock, "1.4.2", archive, None);

        let path = manager.install("1.4.2").unwrap();
        assert_eq!(path, tmp.path().join("terraform-1.4.2"));
        assert_eq!(manager.get("1.4.2"), Some(path.clone()));
        assert_eq!(
            sha256_hex(&fs::read(&path).unwrap()),
            sha256_hex(b"#!/bin/sh\necho v1.4.2\n")
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_install_is_idempotent_and_offline() {
        let tmp = TempDir::new().unwrap();
        let existing = tmp.path().join("terraform-1.4.2");
        fs::write(&existing, "binary").unwrap();
        let (manager, mock) = manager(tmp.path());

        assert_eq!(manager.install("1.4.2").unwrap(), existing);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_install_checksum_mismatch_installs_nothing() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        publish(&mock, "1.4.2", release_zip(b"tampered"), Some(&"0".repeat(64)));

        assert!(matches!(
            manager.install("1.4.2"),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(manager.get("1.4.2").is_none());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_install_download_failure() {
        let tmp = TempDir::new().unwrap();
        let (manager, _mock) = manager(tmp.path());
        assert!(matches!(
            manager.install("1.4.2"),
            Err(Error::Http { status: Some(404), .. })
        ));
        assert!(manager.list().is_empty());
    }

    #[test]
    fn test_install_rejects_non_version() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        assert!(matches!(
            manager.install("~> 1.4"),
            Err(Error::InvalidVersion { .. })
        ));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        publish(&mock, "1.4.2", release_zip(b"bin"), None);

        let path = manager.install("1.4.2").unwrap();
        assert!(manager.remove("1.4.2").unwrap());
        assert!(!path.exists());
        assert!(manager.get("1.4.2").is_none());
        assert!(!manager.remove("1.4.2").unwrap());
    }

    #[test]
    fn test_list_and_search() {
        let tmp = TempDir::new().unwrap();
        let (manager, _mock) = manager(tmp.path());
        assert_eq!(manager.search(), "terraform");

        fs::write(tmp.path().join("terraform-0.12.31"), "").unwrap();
        fs::write(tmp.path().join("terraform-1.4.2"), "").unwrap();
        assert_eq!(manager.list(), vec!["0.12.31", "1.4.2"]);
        assert_eq!(
            manager.search(),
            tmp.path().join("terraform-1.4.2").display().to_string()
        );
    }

    #[test]
    fn test_resolve_pessimistic_picks_highest_patch() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(
            format!("{}/", RELEASES),
            index(&["1.1.9", "1.2.0", "1.2.3", "1.2.10", "1.3.0", "1.3.0-beta1"]),
        );

        assert_eq!(manager.resolve("~> 1.2.0").unwrap(), "1.2.10");
        assert_eq!(manager.resolve(">= 1.1, <= 1.2.3").unwrap(), "1.2.3");
        assert_eq!(manager.resolve("= 1.1.9").unwrap(), "1.1.9");
    }

    #[test]
    fn test_resolve_exact_installed_is_offline() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("terraform-0.11.14"), "").unwrap();
        let (manager, mock) = manager(tmp.path());

        assert_eq!(manager.resolve("= 0.11.14").unwrap(), "0.11.14");
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_resolve_error_kinds() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(format!("{}/", RELEASES), index(&["1.4.2"]));

        assert!(matches!(
            manager.resolve("~>"),
            Err(Error::UnparsableConstraint(_))
        ));
        assert!(matches!(
            manager.resolve("~> 9.9.0"),
            Err(Error::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_resolve_tolerates_unreachable_index() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("terraform-1.4.2"), "").unwrap();
        let (manager, _mock) = manager(tmp.path());

        assert_eq!(manager.resolve("~> 1.4.0").unwrap(), "1.4.2");
        assert!(matches!(
            manager.resolve("~> 1.5.0"),
            Err(Error::Http { .. })
        ));
    }

    #[test]
    fn test_releases_sorted_and_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(
            format!("{}/", RELEASES),
            format!("{}{}", index(&["1.4.2", "0.11.14"]), index(&["1.4.2"])),
        );

        let releases: Vec<String> = manager.releases().unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(releases, vec!["0.11.14", "1.4.2"]);
    }

    #[test]
    fn test_latest_from_downloads_page() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(
            DOWNLOADS,
            format!(
                "<a href=\"{r}/1.5.7/terraform_1.5.7_linux_amd64.zip\">\
                 <a href=\"{r}/1.4.2/terraform_1.4.2_linux_amd64.zip\">",
                r = RELEASES
            ),
        );
        assert_eq!(manager.latest().unwrap(), "1.5.7");
    }

    #[test]
    fn test_latest_falls_back_to_release_index() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(DOWNLOADS, "<html>moved</html>");
        mock.add(format!("{}/", RELEASES), index(&["1.4.2", "1.6.0-alpha1", "1.5.7"]));
        assert_eq!(manager.latest().unwrap(), "1.5.7");
    }

    #[test]
    fn test_resolve_latest_keyword() {
        let tmp = TempDir::new().unwrap();
        let (manager, mock) = manager(tmp.path());
        mock.add(DOWNLOADS, "<html>moved</html>");
        mock.add(format!("{}/", RELEASES), index(&["1.4.2", "1.6.0-alpha1", "1.5.7"]));

        assert_eq!(manager.resolve("latest").unwrap(), "1.5.7");
        assert_eq!(manager.resolve(" LATEST ").unwrap(), "1.5.7");
    }

    #[test]
    fn test_seatbelt() {
        let tmp = TempDir::new().unwrap();
        let (manager, _mock) = manager(tmp.path());

        assert!(matches!(
            manager.seatbelt(None),
            Err(Error::NotInstalled { .. })
        ));

        fs::write(tmp.path().join("terraform-0.11.7"), "").unwrap();
        assert!(matches!(
            manager.seatbelt(None),
            Err(Error::VersionMismatch { .. })
        ));

        fs::write(tmp.path().join("terraform-1.4.2"), "").unwrap();
        manager.seatbelt(None).unwrap();
        manager.seatbelt(Some("1.4.2")).unwrap();

        match manager.seatbelt(Some("1.5.7")) {
            Err(Error::VersionMismatch { required, .. }) => {
                assert_eq!(required.as_deref(), Some("1.5.7"));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_path() {
        let tmp = TempDir::new().unwrap();
        let (manager, _mock) = manager(tmp.path());
        let expected = format!("terraform-1.4.2{}", platform::executable_extension());
        assert_eq!(manager.binary_path("1.4.2"), tmp.path().join(expected));
    }
}
