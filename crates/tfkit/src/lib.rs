//! # tfkit
//!
//! Pure Rust library for installing, invoking and reading the output of the
//! Terraform engine across its release lines.
//!
//! This crate provides functionality for:
//! - Resolving version constraints against installed and published releases
//! - Installing checksum-verified engine binaries side by side
//! - Compiling typed options into engine argument vectors
//! - Running the engine in a stack directory, with deadlines and cancellation
//! - Selecting per-release-line behavior (plan dialect, upgrade path)
//! - Summarizing and fingerprinting saved plans
//!
//! ## Example
//!
//! ```no_run
//! use tfkit::{Adapter, ManagerConfig, ProcessRunner, StackContext, VersionManager};
//!
//! let manager = VersionManager::new(ManagerConfig::new().with_install_dir("~/.local/bin"));
//! let mut stack = StackContext::new("network", "stacks/network");
//! stack.options.autoinstall = true;
//!
//! let adapter = Adapter::prepare(&manager, &ProcessRunner, &stack)?;
//! adapter.init()?;
//! let outcome = adapter.plan()?;
//! println!("{:?}: {}", outcome.status(), outcome.output);
//! # Ok::<(), tfkit::Error>(())
//! ```
//!
//! ## Release lines
//!
//! | Revision | Versions | Plan dialect | Upgrades to |
//! |----------|----------|--------------|-------------|
//! | rev011   | 0.11.x   | Legacy       | 0.12        |
//! | rev012   | 0.12.x   | Modern       | 0.13        |
//! | rev013   | 0.13.x   | Modern       |             |
//! | rev014   | 0.14.x   | Modern       |             |
//! | rev015   | 0.15.x   | Modern       |             |
//! | rev1     | 1.x      | Modern       |             |
//!
//! ## Platform Detection
//!
//! ```no_run
//! use tfkit::platform;
//!
//! let platform = platform::detect().expect("unsupported platform");
//! println!("Archive: {}", platform.archive_name("1.4.2"));
//! // Output: "terraform_1.4.2_linux_amd64.zip" (on x86_64 Linux)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod commands;
pub mod error;
pub mod planfile;
pub mod platform;
pub mod revision;
pub mod settings;
pub mod types;
pub mod version_manager;

pub use backend::http::HttpTransport;
pub use backend::{MockTransport, Transport};
pub use commands::exec::{Invocation, ProcessRunner, RecordingRunner, Runner};
pub use commands::options::{CancellationToken, FlagValue, Options, cancellation_token};
pub use commands::{Command, Subcommand, execute};
pub use error::{Error, ErrorCategory, Result};
pub use planfile::{PlanFile, PlanFormat};
pub use revision::{Adapter, CleanupRules, PlanOutcome, PlanStatus, Revision, StackContext};
pub use types::{CapturedOutput, ExecutionResult, Platform};
pub use version_manager::{Constraint, Inventory, ManagerConfig, VersionManager};
