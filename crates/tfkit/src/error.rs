//! Error types for engine operations.
//!
//! This module provides error types and categories for everything tfkit does:
//! argument validation, version resolution, installation, subprocess
//! execution and revision dispatch. Errors are categorized so batch callers
//! can decide whether one stack's failure should abort the whole run.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for tfkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of tfkit errors for retry logic and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid command options (caught before any subprocess runs).
    Configuration,
    /// Host OS or CPU has no published engine archive.
    Platform,
    /// Constraint could not be parsed, satisfied, or met by the inventory.
    Version,
    /// Downloaded artifact failed verification.
    Integrity,
    /// Engine release line or operation not supported.
    Unsupported,
    /// Network-related errors (transient, retryable).
    Network,
    /// Permission denied on the filesystem.
    Permission,
    /// Unexpected archive, manifest or response format.
    Format,
    /// The engine process could not be run to completion.
    Process,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Invalid configuration",
            Self::Platform => "Unsupported platform",
            Self::Version => "Engine version problem",
            Self::Integrity => "Checksum verification failed",
            Self::Unsupported => "Unsupported engine revision or operation",
            Self::Network => "Network connectivity issue",
            Self::Permission => "Permission denied",
            Self::Format => "Invalid file format",
            Self::Process => "Engine process failure",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Remove the unknown option from the command overrides",
            Self::Platform => "Terraform does not publish a build for this host",
            Self::Version => "Check the version constraint and the installed binaries",
            Self::Integrity => "The download may be corrupted or tampered with; do not retry blindly",
            Self::Unsupported => "Pin the stack to a supported Terraform release line",
            Self::Network => "Check your internet connection and try again",
            Self::Permission => "Check directory permissions or run with appropriate access",
            Self::Format => "The downloaded file may be corrupted, try again",
            Self::Process => "Check that the engine binary exists and is executable",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during tfkit operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Options contained keys the subcommand does not accept.
    #[error("invalid arguments for `{subcommand}`: {}", keys.join(", "))]
    Configuration {
        /// Subcommand being compiled.
        subcommand: String,
        /// Offending keys, sorted.
        keys: Vec<String>,
    },

    /// Failed to map the host to a published archive.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// The version expression is not syntactically valid.
    #[error("unparsable version constraint: `{0}`")]
    UnparsableConstraint(String),

    /// The expression is valid but no known release satisfies it.
    #[error("invalid version: no known release satisfies `{constraint}`")]
    InvalidVersion {
        /// The constraint as written.
        constraint: String,
    },

    /// No engine binary is installed at all.
    #[error("Terraform not installed (minimum: {minimum}, required: {})", required.as_deref().unwrap_or("any"))]
    NotInstalled {
        /// Minimum supported version.
        minimum: String,
        /// Version the caller asked for.
        required: Option<String>,
    },

    /// Installed binaries do not meet the minimum or the requested version.
    #[error("Terraform version mismatch (minimum: {minimum}, required: {})", required.as_deref().unwrap_or("any"))]
    VersionMismatch {
        /// Minimum supported version.
        minimum: String,
        /// Version the caller asked for.
        required: Option<String>,
    },

    /// Downloaded archive does not match the published checksum.
    #[error("FATAL: calculated sum does not match published value for {file} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        /// Archive file name.
        file: String,
        /// Digest from the manifest.
        expected: String,
        /// Digest of the download.
        actual: String,
    },

    /// The checksum manifest has no entry for the archive.
    #[error("no published checksum for {file}")]
    ChecksumMissing {
        /// Archive file name.
        file: String,
    },

    /// The engine version has no revision adapter row.
    #[error("unsupported Terraform revision: {version}")]
    UnsupportedRevision {
        /// Resolved engine version.
        version: String,
    },

    /// The operation is not available on this revision.
    #[error("unsupported operation `{operation}` for revision {revision}")]
    UnsupportedOperation {
        /// Operation name.
        operation: String,
        /// Revision identifier.
        revision: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Failed to download an artifact.
    #[error("download failed for {url}: {message}")]
    DownloadFailed {
        /// URL being downloaded.
        url: String,
        /// Error message.
        message: String,
    },

    /// Failed to read the release archive.
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The engine binary could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The engine ran past its deadline and was killed.
    #[error("{program} timed out after {}s", after.as_secs())]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Deadline that expired.
        after: Duration,
    },

    /// The run was cancelled by the caller.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Program that was killed.
        program: String,
    },

    /// `show` on a saved plan exited non-zero.
    #[error("error reading plan file {path} (exit {exit_code}): {stderr}")]
    PlanRead {
        /// Plan file path.
        path: PathBuf,
        /// Exit code of `show`.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// Invalid response from a release endpoint.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration { .. } => ErrorCategory::Configuration,
            Error::UnsupportedPlatform { .. } => ErrorCategory::Platform,
            Error::UnparsableConstraint(_)
            | Error::InvalidVersion { .. }
            | Error::NotInstalled { .. }
            | Error::VersionMismatch { .. } => ErrorCategory::Version,
            Error::ChecksumMismatch { .. } | Error::ChecksumMissing { .. } => {
                ErrorCategory::Integrity
            }
            Error::UnsupportedRevision { .. } | Error::UnsupportedOperation { .. } => {
                ErrorCategory::Unsupported
            }
            Error::Http { .. } | Error::DownloadFailed { .. } => ErrorCategory::Network,
            Error::Archive(_) | Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::Io { source, .. } | Error::Spawn { source, .. } => {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    ErrorCategory::Permission
                } else if matches!(self, Error::Spawn { .. }) {
                    ErrorCategory::Process
                } else {
                    ErrorCategory::Other
                }
            }
            Error::Timeout { .. } | Error::Cancelled { .. } | Error::PlanRead { .. } => {
                ErrorCategory::Process
            }
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}
