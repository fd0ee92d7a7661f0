mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod stack;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::stacks::Operation;
use std::io;

use crate::config::Config;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub config: Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Commands::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "stackform", &mut io::stdout());
        return Ok(());
    }

    let project_file = paths::project_file(cli.config.as_deref());
    let config = Config::load(&project_file)
        .with_context(|| format!("Failed to load {}", project_file.display()))?;
    ui::set_color(!config.misc.disable_color);

    let ctx = Context {
        quiet: cli.quiet,
        config,
    };

    match cli.command {
        Commands::Install { constraint } => commands::engine::install(&ctx, &constraint),
        Commands::Remove { version } => commands::engine::remove(&ctx, &version),
        Commands::List => commands::engine::list(&ctx),
        Commands::Resolve { constraint } => commands::engine::resolve(&ctx, &constraint),
        Commands::Latest => commands::engine::latest(&ctx),
        Commands::Init(args) => commands::stacks::run(&ctx, Operation::Init, &args),
        Commands::Plan(args) => commands::stacks::run(&ctx, Operation::Plan, &args),
        Commands::Quickplan(args) => commands::stacks::run(&ctx, Operation::Quickplan, &args),
        Commands::Audit(args) => commands::stacks::audit(&ctx, &args),
        Commands::Apply(args) => commands::stacks::run(&ctx, Operation::Apply, &args),
        Commands::Refresh(args) => commands::stacks::run(&ctx, Operation::Refresh, &args),
        Commands::Destroy(args) => commands::stacks::run(&ctx, Operation::Destroy, &args),
        Commands::Fmt(args) => commands::stacks::run(&ctx, Operation::Fmt, &args),
        Commands::Lint(args) => commands::stacks::run(&ctx, Operation::Lint, &args),
        Commands::Validate(args) => commands::stacks::run(&ctx, Operation::Validate, &args),
        Commands::Clean(args) => commands::stacks::run(&ctx, Operation::Clean, &args),
        Commands::Upgrade(args) => commands::stacks::run(&ctx, Operation::Upgrade, &args),
        Commands::Show(args) => commands::stacks::show(&ctx, &args),
        Commands::Stacks => commands::stacks::list(&ctx),
        Commands::Config => {
            print!("{}", ctx.config.to_toml()?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}
