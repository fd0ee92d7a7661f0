//! Engine management: install, remove and inspect terraform binaries.

use anyhow::{Context as _, Result};
use colored::Colorize;
use tfkit::VersionManager;

use crate::Context;
use crate::paths;
use crate::progress;
use crate::ui;

fn manager(ctx: &Context) -> VersionManager {
    VersionManager::new(ctx.config.manager_config())
}

/// Install the highest release matching `constraint`.
pub fn install(ctx: &Context, constraint: &str) -> Result<()> {
    let manager = manager(ctx);
    let version = manager
        .resolve(constraint)
        .with_context(|| format!("Failed to resolve `{}`", constraint))?;

    if let Some(path) = manager.get(&version) {
        ui::info(&format!("terraform {} already installed", version));
        ui::dim(&paths::contract_home(&path));
        return Ok(());
    }

    let pb = progress::spinner(&format!("Installing terraform {}", version), ctx.quiet);
    match manager.install(&version) {
        Ok(path) => {
            progress::finish_success(&pb, &format!("Installed terraform {}", version));
            if !ctx.quiet {
                ui::dim(&paths::contract_home(&path));
            }
            Ok(())
        }
        Err(e) => {
            progress::finish_clear(&pb);
            let advice = e.category().advice();
            Err(e).with_context(|| format!("Failed to install terraform {} ({})", version, advice))
        }
    }
}

/// Remove an installed version.
pub fn remove(ctx: &Context, version: &str) -> Result<()> {
    if manager(ctx).remove(version)? {
        ui::success(&format!("Removed terraform {}", version));
    } else {
        ui::warn(&format!("terraform {} is not installed", version));
    }
    Ok(())
}

/// List installed versions, newest first.
pub fn list(ctx: &Context) -> Result<()> {
    let manager = manager(ctx);
    let inventory = manager.inventory();
    let install_dir = paths::contract_home(manager.config().install_dir());

    if inventory.is_empty() {
        ui::warn(&format!("No terraform binaries in {}", install_dir));
        return Ok(());
    }

    ui::header(&format!("Installed ({})", inventory.len()));
    ui::kv("Directory", &install_dir);
    println!();
    let newest = inventory.latest().map(|(v, _)| v.clone());
    for (version, path) in inventory.iter().rev() {
        let marker = if Some(version) == newest.as_ref() {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!(
            "  {} {} {}",
            marker,
            version,
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
                .dimmed()
        );
    }
    Ok(())
}

/// Print what `constraint` resolves to.
pub fn resolve(ctx: &Context, constraint: &str) -> Result<()> {
    let version = manager(ctx)
        .resolve(constraint)
        .with_context(|| format!("Failed to resolve `{}`", constraint))?;
    println!("{}", version);
    Ok(())
}

/// Print the latest published release.
pub fn latest(ctx: &Context) -> Result<()> {
    let version = manager(ctx)
        .latest()
        .context("Failed to look up the latest terraform release")?;
    println!("{}", version);
    Ok(())
}
