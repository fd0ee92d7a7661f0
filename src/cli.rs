use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::paths::ENV_CONFIG;

#[derive(Parser)]
#[command(name = "stackform")]
#[command(version)]
#[command(about = "Run terraform across many stacks with the right engine version", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project file (default: ./stackform.toml)
    #[arg(long, global = true, env = ENV_CONFIG, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ------------------------------------------------------------------------
    // Engine management
    // ------------------------------------------------------------------------
    /// Install the terraform release matching a constraint
    Install {
        /// Version or constraint (`1.4.2`, `~> 0.12.0`, `latest`)
        #[arg(default_value = "latest")]
        constraint: String,
    },

    /// Remove an installed terraform binary
    Remove {
        /// Exact version
        #[arg(id = "exact_version", value_name = "VERSION")]
        version: String,
    },

    /// List installed terraform binaries
    List,

    /// Print the version a constraint resolves to
    Resolve {
        /// Version or constraint
        constraint: String,
    },

    /// Print the latest published terraform release
    Latest,

    // ------------------------------------------------------------------------
    // Stack operations
    // ------------------------------------------------------------------------
    /// Initialize stacks
    Init(StackArgs),

    /// Plan stacks, saving a plan file in each
    Plan(StackArgs),

    /// Clean, init and plan stacks
    Quickplan(StackArgs),

    /// Clean, init and plan stacks; pending changes count as failures
    Audit(AuditArgs),

    /// Apply the saved plan of stacks that have one
    Apply(StackArgs),

    /// Refresh stack state
    Refresh(StackArgs),

    /// Destroy stacks
    Destroy(StackArgs),

    /// Format stack sources
    Fmt(StackArgs),

    /// Check stack formatting
    Lint(StackArgs),

    /// Validate stacks
    Validate(StackArgs),

    /// Remove plan files, lock files, archives and engine state directories
    Clean(StackArgs),

    /// Clean, init, upgrade to the next release line and format
    Upgrade(StackArgs),

    /// Print the saved plan of stacks
    Show(ShowArgs),

    // ------------------------------------------------------------------------
    // Project
    // ------------------------------------------------------------------------
    /// List stacks and their resolved engine version
    Stacks,

    /// Print the compiled configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct StackArgs {
    /// Stack names (default: every stack under the base folder)
    pub stacks: Vec<String>,

    /// Number of stacks to run in parallel
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,
}

#[derive(Parser)]
pub struct AuditArgs {
    #[command(flatten)]
    pub stacks: StackArgs,

    /// Write `<base_folder>.audit.json` with the failed stacks
    #[arg(long)]
    pub report: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    /// Stack names (default: every stack under the base folder)
    pub stacks: Vec<String>,

    /// Render as markdown
    #[arg(long, conflicts_with = "checksum")]
    pub markdown: bool,

    /// Print only the normalized plan checksum
    #[arg(long)]
    pub checksum: bool,
}
