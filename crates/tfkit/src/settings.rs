//! `required_version` declarations in a stack's settings files.
//!
//! Stacks pin their engine version in a `terraform { required_version = ... }`
//! block, conventionally in `versions.tf` but sometimes in `settings.tf` or
//! `backend.tf`. These helpers read the effective constraint and rewrite the
//! declaration during upgrades.

use crate::error::{Error, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Files searched for `required_version`, in precedence order (last wins).
pub const SETTINGS_FILES: &[&str] = &["settings.tf", "versions.tf", "backend.tf"];

/// File the pinned constraint is written to.
pub const VERSIONS_FILE: &str = "versions.tf";

static REQUIRED_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*required_version\s*=\s*"([^"]*)""#).expect("required_version regex is valid")
});

static TERRAFORM_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*terraform\s*\{\s*$").expect("terraform block regex is valid"));

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with("//")
}

/// Constraint declared in the stack's settings files, if any.
///
/// Commented-out lines are ignored. When several declarations exist the
/// last one, in [`SETTINGS_FILES`] order, wins.
#[must_use]
pub fn required_version(stack_dir: &Path) -> Option<String> {
    SETTINGS_FILES
        .iter()
        .filter_map(|file| fs::read_to_string(stack_dir.join(file)).ok())
        .flat_map(|content| {
            content
                .lines()
                .filter(|line| !is_comment(line))
                .filter_map(|line| REQUIRED_VERSION_RE.captures(line))
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .last()
}

/// Remove `required_version` lines from `path`. Returns whether it changed.
///
/// A missing file is left alone.
pub fn strip_required_version(path: &Path) -> Result<bool> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(path, e)),
    };

    let kept: Vec<&str> = content
        .lines()
        .filter(|line| is_comment(line) || !REQUIRED_VERSION_RE.is_match(line))
        .collect();
    if kept.len() == content.lines().count() {
        return Ok(false);
    }

    write_lines(path, &kept, content.ends_with('\n'))?;
    log::debug!("Removed required_version from {}", path.display());
    Ok(true)
}

/// Pin `required_version = "<constraint>"` in `path`.
///
/// An existing declaration is replaced; otherwise it is added to the first
/// `terraform {` block, or a new block is appended. The file is created
/// when missing.
pub fn pin_required_version(path: &Path, constraint: &str) -> Result<()> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::io(path, e)),
    };
    let declaration = format!("required_version = \"{}\"", constraint);

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let existing = lines
        .iter()
        .position(|line| !is_comment(line) && REQUIRED_VERSION_RE.is_match(line));

    if let Some(index) = existing {
        let indent: String = lines[index]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        lines[index] = format!("{}{}", indent, declaration);
    } else if let Some(index) = lines.iter().position(|line| TERRAFORM_BLOCK_RE.is_match(line)) {
        lines.insert(index + 1, format!("  {}", declaration));
    } else {
        if lines.last().is_some_and(|line| !line.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push("terraform {".to_string());
        lines.push(format!("  {}", declaration));
        lines.push("}".to_string());
    }

    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_lines(path, &refs, true)?;
    log::debug!("Pinned {} in {}", declaration, path.display());
    Ok(())
}

fn write_lines(path: &Path, lines: &[&str], trailing_newline: bool) -> Result<()> {
    let mut content = lines.join("\n");
    if trailing_newline && !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_required_version_none() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("main.tf"), "resource \"null_resource\" \"x\" {}\n").unwrap();
        assert_eq!(required_version(tmp.path()), None);
    }

    #[test]
    fn test_required_version_last_wins_and_skips_comments() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("settings.tf"),
            "terraform {\n  required_version = \"~> 0.11.14\"\n}\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("versions.tf"),
            "terraform {\n  required_version = \"~> 0.12.31\"\n  # required_version = \"~> 0.13.0\"\n}\n",
        )
        .unwrap();

        assert_eq!(required_version(tmp.path()).as_deref(), Some("~> 0.12.31"));
    }

    #[test]
    fn test_strip_required_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backend.tf");
        fs::write(
            &path,
            "terraform {\n  required_version = \">= 0.11.10\"\n  backend \"s3\" {}\n}\n",
        )
        .unwrap();

        assert!(strip_required_version(&path).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "terraform {\n  backend \"s3\" {}\n}\n"
        );
        assert!(!strip_required_version(&path).unwrap());
        assert!(!strip_required_version(&tmp.path().join("missing.tf")).unwrap());
    }

    #[test]
    fn test_pin_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(VERSIONS_FILE);
        fs::write(&path, "terraform {\n    required_version = \"~> 0.11.14\"\n}\n").unwrap();

        pin_required_version(&path, "~> 0.12.0").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "terraform {\n    required_version = \"~> 0.12.0\"\n}\n"
        );
    }

    #[test]
    fn test_pin_inserts_into_block() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(VERSIONS_FILE);
        fs::write(&path, "terraform {\n  backend \"local\" {}\n}\n").unwrap();

        pin_required_version(&path, "~> 0.13.0").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "terraform {\n  required_version = \"~> 0.13.0\"\n  backend \"local\" {}\n}\n"
        );
    }

    #[test]
    fn test_pin_creates_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(VERSIONS_FILE);

        pin_required_version(&path, "~> 0.12.0").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "terraform {\n  required_version = \"~> 0.12.0\"\n}\n"
        );
        assert_eq!(required_version(tmp.path()).as_deref(), Some("~> 0.12.0"));
    }

    #[test]
    fn test_pin_appends_block() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(VERSIONS_FILE);
        fs::write(&path, "provider \"aws\" {}\n").unwrap();

        pin_required_version(&path, "~> 0.12.0").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "provider \"aws\" {}\n\nterraform {\n  required_version = \"~> 0.12.0\"\n}\n"
        );
    }
}
