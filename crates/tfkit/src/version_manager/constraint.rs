//! Version constraint expressions.
//!
//! Understands the engine's own constraint syntax: comma separated clauses
//! of `=`, `!=`, `>`, `>=`, `<`, `<=` and the pessimistic `~>` operator,
//! with one to three numeric components. A bare version is an exact match.
//!
//! ```
//! use tfkit::Constraint;
//!
//! let c = Constraint::parse("~> 1.2.0").unwrap();
//! assert!(c.matches(&"1.2.9".parse().unwrap()));
//! assert!(!c.matches(&"1.3.0".parse().unwrap()));
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use semver::Version;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<op>~>|>=|<=|!=|=|>|<)?\s*v?(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\.(?P<patch>\d+))?(?:-(?P<pre>[0-9A-Za-z.-]+))?\s*$",
    )
    .expect("constraint clause regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    op: Op,
    version: Version,
    /// Number of components written (1-3); drives `~>` semantics.
    precision: u8,
}

impl Clause {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Op::Eq => candidate == &self.version,
            Op::Ne => candidate != &self.version,
            Op::Gt => candidate > &self.version,
            Op::Ge => candidate >= &self.version,
            Op::Lt => candidate < &self.version,
            Op::Le => candidate <= &self.version,
            Op::Pessimistic => {
                if candidate < &self.version {
                    return false;
                }
                match self.precision {
                    3 => {
                        candidate.major == self.version.major
                            && candidate.minor == self.version.minor
                    }
                    2 => candidate.major == self.version.major,
                    _ => true,
                }
            }
        }
    }
}

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    clauses: Vec<Clause>,
}

impl Constraint {
    /// Parse a constraint expression.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnparsableConstraint` for empty expressions, operators
    /// without a version (`~>`) and anything else outside the grammar.
    pub fn parse(expr: &str) -> Result<Self> {
        let raw = expr.trim();
        if raw.is_empty() {
            return Err(Error::UnparsableConstraint(expr.to_string()));
        }

        let clauses = raw
            .split(',')
            .map(|clause| parse_clause(clause).ok_or_else(|| Error::UnparsableConstraint(expr.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            clauses,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pinned version when the constraint is a single exact clause.
    #[must_use]
    pub fn exact(&self) -> Option<&Version> {
        match self.clauses.as_slice() {
            [clause] if clause.op == Op::Eq => Some(&clause.version),
            _ => None,
        }
    }

    /// Whether `candidate` satisfies every clause.
    ///
    /// Pre-release candidates only match when some clause names a
    /// pre-release itself.
    #[must_use]
    pub fn matches(&self, candidate: &Version) -> bool {
        if !candidate.pre.is_empty() && self.clauses.iter().all(|c| c.version.pre.is_empty()) {
            return false;
        }
        self.clauses.iter().all(|clause| clause.matches(candidate))
    }

    /// Highest candidate satisfying the constraint.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.matches(v)).max()
    }
}

impl FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_clause(clause: &str) -> Option<Clause> {
    let caps = CLAUSE_RE.captures(clause)?;

    let op = match caps.name("op").map(|m| m.as_str()) {
        None | Some("=") => Op::Eq,
        Some("!=") => Op::Ne,
        Some(">") => Op::Gt,
        Some(">=") => Op::Ge,
        Some("<") => Op::Lt,
        Some("<=") => Op::Le,
        Some("~>") => Op::Pessimistic,
        Some(_) => return None,
    };

    let component = |name: &str| -> Option<Option<u64>> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok().map(Some),
            None => Some(None),
        }
    };

    let major = component("major")??;
    let minor = component("minor")?;
    let patch = component("patch")?;
    let precision = 1 + u8::from(minor.is_some()) + u8::from(patch.is_some());

    let mut version = Version::new(major, minor.unwrap_or(0), patch.unwrap_or(0));
    if let Some(pre) = caps.name("pre") {
        version.pre = semver::Prerelease::new(pre.as_str()).ok()?;
    }

    Some(Clause {
        op,
        version,
        precision,
    })
}
