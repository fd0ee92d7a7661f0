//! Parsed output of `show` on a saved plan.
//!
//! A [`PlanFile`] counts the resources a plan adds, changes and destroys,
//! renders the engine's own summary line and carries a checksum of the
//! normalized text (see [`normalize`]) for comparing plans across runs.
//!
//! ```
//! use tfkit::{PlanFile, PlanFormat};
//!
//! let raw = "\
//! + aws_instance.web
//! + aws_eip.web
//! ~ aws_security_group.web
//! ";
//! let plan = PlanFile::parse(raw, PlanFormat::Legacy);
//! assert_eq!(plan.summary(), "Plan: 2 to add, 1 to change, 0 to destroy.");
//! assert!(plan.is_modified());
//! ```

pub mod normalize;

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Summary when a plan has nothing to do.
pub const NO_CHANGES: &str = "No changes. Infrastructure is up-to-date.";

/// File extension of saved plans.
pub const PLAN_EXTENSION: &str = "tfout";

/// Marker after which modern output lists resource actions.
const ACTIONS_MARKER: &str = "Terraform will perform the following actions";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,2}(-/\+|[+~-])(?:\s|$)").expect("action regex is valid")
});

/// Plan output dialect, fixed per engine revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanFormat {
    /// 0.11: `attr: "old" => "new"` with pretty-printed escaped JSON.
    Legacy,
    /// 0.12 and later: `attr = "old" -> "new"` with single-line escaped
    /// JSON, preceded by a symbol legend.
    Modern,
}

/// A parsed plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFile {
    data: String,
    format: PlanFormat,
    add: usize,
    change: usize,
    destroy: usize,
    summary: String,
    normalized: String,
    checksum: String,
    stack_name: Option<String>,
    base_folder: Option<String>,
}

impl PlanFile {
    /// Parse raw `show` output.
    #[must_use]
    pub fn parse(raw: &str, format: PlanFormat) -> Self {
        let (add, change, destroy) = count_actions(raw, format);
        let summary = if add + change + destroy == 0 {
            NO_CHANGES.to_string()
        } else {
            format!(
                "Plan: {} to add, {} to change, {} to destroy.",
                add, change, destroy
            )
        };

        let normalized = normalize::normalize(raw, format);
        let checksum = blake3::hash(normalized.as_bytes()).to_hex().to_string();

        Self {
            data: raw.to_string(),
            format,
            add,
            change,
            destroy,
            summary,
            normalized,
            checksum,
            stack_name: None,
            base_folder: None,
        }
    }

    /// Parse output of `show <plan_path>`, naming the plan after its path.
    ///
    /// `stacks/network/network.tfout` yields stack `network` in base
    /// folder `stacks`.
    #[must_use]
    pub fn for_path(raw: &str, format: PlanFormat, plan_path: &Path) -> Self {
        let mut plan = Self::parse(raw, format);
        plan.stack_name = plan_path.file_name().map(|name| {
            let name = name.to_string_lossy();
            name.strip_suffix(&format!(".{}", PLAN_EXTENSION))
                .unwrap_or(&*name)
                .to_string()
        });
        plan.base_folder = plan_path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        plan
    }

    /// Raw `show` output.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Dialect the plan was parsed with.
    #[must_use]
    pub fn format(&self) -> PlanFormat {
        self.format
    }

    /// Resources to create (replacements count here and in destroy).
    #[must_use]
    pub fn add_count(&self) -> usize {
        self.add
    }

    /// Resources updated in place.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.change
    }

    /// Resources to destroy.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.destroy
    }

    /// `Plan: ...` line, or [`NO_CHANGES`].
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Text the checksum is computed over.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// BLAKE3 hex digest of the normalized text.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Whether anything would change.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.add + self.change + self.destroy > 0
    }

    /// Stack name, when parsed from a plan path.
    #[must_use]
    pub fn stack_name(&self) -> Option<&str> {
        self.stack_name.as_deref()
    }

    /// Folder containing the stack, when parsed from a plan path.
    #[must_use]
    pub fn base_folder(&self) -> Option<&str> {
        self.base_folder.as_deref()
    }

    /// `base_folder/stack_name`, omitting whichever is unknown.
    #[must_use]
    pub fn stack_identifier(&self) -> String {
        [self.base_folder.as_deref(), self.stack_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Markdown for pull request comments.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        [
            format!("#### {}", self.stack_identifier()),
            "```".to_string(),
            self.data.trim_end_matches('\n').to_string(),
            format!("  {}", self.summary),
            "```".to_string(),
        ]
        .join("\n")
    }
}

impl fmt::Display for PlanFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl PartialOrd for PlanFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data
            .cmp(&other.data)
            .then_with(|| self.stack_identifier().cmp(&other.stack_identifier()))
    }
}

fn count_actions(raw: &str, format: PlanFormat) -> (usize, usize, usize) {
    let body = match format {
        PlanFormat::Modern => raw
            .find(ACTIONS_MARKER)
            .map_or(raw, |at| &raw[at..]),
        PlanFormat::Legacy => raw,
    };

    let (mut add, mut change, mut destroy) = (0, 0, 0);
    for line in body.lines() {
        let Some(caps) = ACTION_RE.captures(line) else {
            continue;
        };
        match caps.get(1).map(|m| m.as_str()) {
            Some("+") => add += 1,
            Some("~") => change += 1,
            Some("-") => destroy += 1,
            Some("-/+") => {
                add += 1;
                destroy += 1;
            }
            _ => {}
        }
    }
    (add, change, destroy)
}
