//! Process-wide default manager configuration.
//!
//! A convenience for callers that do not thread a [`ManagerConfig`] through
//! explicitly, such as [`crate::commands::execute`]. Reads take a snapshot;
//! writes are single-writer under an `RwLock`. Prefer constructing a
//! [`VersionManager`] with an explicit config.

use super::{ManagerConfig, VersionManager};
use std::sync::{LazyLock, PoisonError, RwLock};

static CONFIG: LazyLock<RwLock<ManagerConfig>> =
    LazyLock::new(|| RwLock::new(ManagerConfig::default()));

/// Snapshot of the current default configuration.
#[must_use]
pub fn config() -> ManagerConfig {
    CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the default configuration.
pub fn configure(config: ManagerConfig) {
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = config;
}

/// Update the default configuration in place.
pub fn update(f: impl FnOnce(ManagerConfig) -> ManagerConfig) {
    let mut guard = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    *guard = f(guard.clone());
}

/// Restore the built-in defaults.
pub fn reset() {
    configure(ManagerConfig::default());
}

/// A manager over the current default configuration.
#[must_use]
pub fn manager() -> VersionManager {
    VersionManager::new(config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn test_configure_and_reset() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let tmp = TempDir::new().unwrap();

        configure(ManagerConfig::new().with_install_dir(tmp.path()));
        assert_eq!(config().install_dir(), tmp.path());
        assert_eq!(manager().config().install_dir(), tmp.path());

        reset();
        assert_eq!(config(), ManagerConfig::default());
    }

    #[test]
    fn test_update() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);

        update(|c| c.with_releases_url("https://mirror.example.com/terraform"));
        assert_eq!(config().releases_url(), "https://mirror.example.com/terraform");

        reset();
        assert_eq!(config().releases_url(), super::super::DEFAULT_RELEASES_URL);
    }
}
