//! Core types shared across tfkit.
//!
//! This module contains the platform descriptor used to pick release
//! archives and the result types returned by engine invocations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the engine, as used in archive, manifest and binary names.
pub const TOOL_NAME: &str = "terraform";

/// Target platform for engine downloads.
///
/// Holds the OS and CPU names exactly as they appear in published archive
/// names.
///
/// # Example
///
/// ```
/// use tfkit::Platform;
///
/// let platform = Platform::new("darwin", "amd64");
/// assert_eq!(platform.archive_name("1.4.2"), "terraform_1.4.2_darwin_amd64.zip");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (e.g., "darwin", "linux", "windows").
    pub os: String,
    /// CPU architecture (e.g., "amd64", "386", "arm").
    pub arch: String,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Archive file name for a version on this platform.
    #[must_use]
    pub fn archive_name(&self, version: &str) -> String {
        format!("{}_{}_{}_{}.zip", TOOL_NAME, version, self.os, self.arch)
    }

    /// Check if this platform is Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

/// Output collected from a captured engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Everything the engine wrote to stdout.
    pub stdout: String,
    /// Everything the engine wrote to stderr.
    pub stderr: String,
}

/// Result of an engine invocation.
///
/// Non-zero exit codes are not errors: their meaning depends on the
/// subcommand (see [`crate::Subcommand::uses_detailed_exit_code`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Process exit code (`-1` when killed by a signal).
    pub exit_code: i32,
    /// Captured streams, present only for captured runs.
    pub output: Option<CapturedOutput>,
}

impl ExecutionResult {
    /// A streamed run that only reports its exit code.
    #[must_use]
    pub fn streamed(exit_code: i32) -> Self {
        Self {
            exit_code,
            output: None,
        }
    }

    /// A captured run.
    #[must_use]
    pub fn captured(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: Some(CapturedOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
            }),
        }
    }

    /// Whether the engine exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured stdout, or an empty string for streamed runs.
    #[must_use]
    pub fn stdout(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stdout.as_str())
    }

    /// Captured stderr, or an empty string for streamed runs.
    #[must_use]
    pub fn stderr(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stderr.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display() {
        let platform = Platform::new("linux", "amd64");
        assert_eq!(format!("{}", platform), "linux_amd64");
        assert!(!platform.is_windows());
    }

    #[test]
    fn test_platform_archive_name() {
        let platform = Platform::new("windows", "386");
        assert_eq!(
            platform.archive_name("0.11.14"),
            "terraform_0.11.14_windows_386.zip"
        );
        assert!(platform.is_windows());
    }

    #[test]
    fn test_platform_serialization() {
        let platform = Platform::new("darwin", "amd64");
        let json = serde_json::to_string(&platform).unwrap();
        let parsed: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, platform);
    }

    #[test]
    fn test_execution_result_streamed() {
        let result = ExecutionResult::streamed(2);
        assert!(!result.success());
        assert_eq!(result.stdout(), "");
        assert!(result.output.is_none());
    }

    #[test]
    fn test_execution_result_captured() {
        let result = ExecutionResult::captured(0, "out", "err");
        assert!(result.success());
        assert_eq!(result.stdout(), "out");
        assert_eq!(result.stderr(), "err");
    }
}
