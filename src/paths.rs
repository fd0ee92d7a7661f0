//! Path resolution for stackform
//!
//! # Environment Variables
//!
//! - `STACKFORM_CONFIG` - Project file to load instead of `./stackform.toml`
//! - `STACKFORM_INSTALL_DIR` - Engine install directory, over any config file
//!
//! # Project File Resolution
//!
//! 1. `--config <file>`
//! 2. `STACKFORM_CONFIG` environment variable
//! 3. `stackform.toml` in the current directory

use std::path::{Path, PathBuf};

use crate::config::PROJECT_FILE;

/// Environment variable for the project file override
pub const ENV_CONFIG: &str = "STACKFORM_CONFIG";

/// Environment variable for the install directory override
pub const ENV_INSTALL_DIR: &str = "STACKFORM_INSTALL_DIR";

/// Project file to load.
///
/// `explicit` is the `--config` value, which clap already falls back to
/// `STACKFORM_CONFIG` for.
pub fn project_file(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => {
            let path = expand_path(&path.to_string_lossy());
            log::debug!("Using project file: {}", path.display());
            path
        }
        None => PathBuf::from(PROJECT_FILE),
    }
}

/// Install directory from `STACKFORM_INSTALL_DIR`, if set and non-empty.
pub fn install_dir_override() -> Option<PathBuf> {
    std::env::var(ENV_INSTALL_DIR)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(|dir| {
            let path = expand_path(&dir);
            log::debug!("Using install dir from {}: {}", ENV_INSTALL_DIR, path.display());
            path
        })
}

/// Expand `~` and environment variables in a path string
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(path).into_owned());
    PathBuf::from(expanded)
}

/// Contract home directory prefix to `~` for display
pub fn contract_home(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

/// Path relative to `base` for display, or the path itself.
pub fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
