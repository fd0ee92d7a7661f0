//! Engine release lines and the behavior that differs between them.
//!
//! Each supported release line is one static [`Revision`] row: the
//! subcommands it offers, the plan output dialect it prints and whether
//! stacks on it can be upgraded to the next line. The table is closed;
//! a new release line needs a new row.

pub mod adapter;

pub use adapter::{Adapter, CleanupRules, PlanOutcome, PlanStatus, StackContext};

use crate::commands::Subcommand;
use crate::error::{Error, Result};
use crate::planfile::PlanFormat;
use semver::Version;
use std::fmt;

/// How a revision upgrades to the next release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradePath {
    /// Minor version of the next line (same major).
    pub target_minor: u64,
    /// Engine word for the upgrade subcommand.
    pub word: &'static str,
}

/// One supported engine release line.
#[derive(Debug, PartialEq, Eq)]
pub struct Revision {
    id: &'static str,
    major: u64,
    /// `None` matches every minor of `major`.
    minor: Option<u64>,
    commands: &'static [Subcommand],
    plan_format: PlanFormat,
    upgrade: Option<UpgradePath>,
}

const STANDARD: &[Subcommand] = &[
    Subcommand::Init,
    Subcommand::Plan,
    Subcommand::Apply,
    Subcommand::Refresh,
    Subcommand::Destroy,
    Subcommand::Fmt,
    Subcommand::Validate,
    Subcommand::Show,
    Subcommand::Version,
];

const UPGRADEABLE: &[Subcommand] = &[
    Subcommand::Init,
    Subcommand::Plan,
    Subcommand::Apply,
    Subcommand::Refresh,
    Subcommand::Destroy,
    Subcommand::Fmt,
    Subcommand::Validate,
    Subcommand::Show,
    Subcommand::Upgrade,
    Subcommand::Version,
];

static REVISIONS: &[Revision] = &[
    Revision {
        id: "rev011",
        major: 0,
        minor: Some(11),
        commands: UPGRADEABLE,
        plan_format: PlanFormat::Legacy,
        upgrade: Some(UpgradePath {
            target_minor: 12,
            word: "0.12upgrade",
        }),
    },
    Revision {
        id: "rev012",
        major: 0,
        minor: Some(12),
        commands: UPGRADEABLE,
        plan_format: PlanFormat::Modern,
        upgrade: Some(UpgradePath {
            target_minor: 13,
            word: "0.13upgrade",
        }),
    },
    Revision {
        id: "rev013",
        major: 0,
        minor: Some(13),
        commands: STANDARD,
        plan_format: PlanFormat::Modern,
        upgrade: None,
    },
    Revision {
        id: "rev014",
        major: 0,
        minor: Some(14),
        commands: STANDARD,
        plan_format: PlanFormat::Modern,
        upgrade: None,
    },
    Revision {
        id: "rev015",
        major: 0,
        minor: Some(15),
        commands: STANDARD,
        plan_format: PlanFormat::Modern,
        upgrade: None,
    },
    Revision {
        id: "rev1",
        major: 1,
        minor: None,
        commands: STANDARD,
        plan_format: PlanFormat::Modern,
        upgrade: None,
    },
];

impl Revision {
    /// Every supported revision.
    #[must_use]
    pub fn all() -> &'static [Revision] {
        REVISIONS
    }

    /// The revision a concrete engine version belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedRevision` when no row covers `version`.
    pub fn for_version(version: &str) -> Result<&'static Revision> {
        let unsupported = || Error::UnsupportedRevision {
            version: version.to_string(),
        };
        let parsed = Version::parse(version.trim()).map_err(|_| unsupported())?;

        REVISIONS
            .iter()
            .find(|rev| rev.major == parsed.major && rev.minor.is_none_or(|m| m == parsed.minor))
            .ok_or_else(unsupported)
    }

    /// Revision identifier (`rev012`).
    #[must_use]
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Subcommands available on this release line.
    #[must_use]
    pub fn commands(&self) -> &'static [Subcommand] {
        self.commands
    }

    /// Whether `subcommand` is available.
    #[must_use]
    pub fn supports(&self, subcommand: Subcommand) -> bool {
        self.commands.contains(&subcommand)
    }

    /// Dialect of `show` output.
    #[must_use]
    pub fn plan_format(&self) -> PlanFormat {
        self.plan_format
    }

    /// Whether stacks can be upgraded to the next line.
    #[must_use]
    pub fn is_upgradeable(&self) -> bool {
        self.upgrade.is_some()
    }

    /// How to upgrade, when upgradeable.
    #[must_use]
    pub fn upgrade_path(&self) -> Option<UpgradePath> {
        self.upgrade
    }

    /// Constraint for the next release line (`~> 0.12.0`).
    #[must_use]
    pub fn next_constraint(&self) -> Option<String> {
        self.upgrade
            .map(|path| format!("~> {}.{}.0", self.major, path.target_minor))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
