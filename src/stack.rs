//! Stack discovery.
//!
//! A stack is any directory directly under the base folder that holds at
//! least one `*.tf` file. Stacks are addressed by directory name; a path such
//! as `stacks/network` is accepted and reduced to its last component.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tfkit::StackContext;
use walkdir::WalkDir;

use crate::config::Config;

/// Version pin file left behind by other version managers; obsolete once a
/// stack pins `required_version` itself.
pub const LEGACY_VERSION_FILE: &str = ".terraform-version";

/// Names of every stack under `base`, sorted.
pub fn discover(base: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(base)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tf"))
        .filter_map(|entry| {
            entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
        })
        .collect();
    names.sort();
    names.dedup();
    log::debug!("Discovered {} stacks under {}", names.len(), base.display());
    names
}

/// Reduce `requested` to a known stack name.
pub fn validate(known: &[String], requested: &str) -> Option<String> {
    let name = requested
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(requested);
    known.iter().find(|k| k.as_str() == name).cloned()
}

/// The stacks to operate on: every stack when `requested` is empty.
pub fn select(config: &Config, requested: &[String]) -> Result<Vec<String>> {
    let known = discover(&config.base_path());
    if requested.is_empty() {
        return Ok(known);
    }

    let mut selected = Vec::new();
    for name in requested {
        match validate(&known, name) {
            Some(stack) if !selected.contains(&stack) => selected.push(stack),
            Some(_) => {}
            None => bail!("Stack not found: {}", name),
        }
    }
    Ok(selected)
}

/// Adapter context for one stack, with its own config layer applied.
pub fn context(project: &Config, name: &str) -> Result<StackContext> {
    let path: PathBuf = project.base_path().join(name);
    let config = project.for_stack(&path)?;

    let mut ctx = StackContext::new(name, &path);
    ctx.base_folder = config.base_folder.clone();
    ctx.options = config.options();
    ctx.overrides = config.overrides();
    ctx.cleanup = config.cleanup_rules();
    ctx.disable_color = config.misc.disable_color;
    ctx.legacy_config = Some(path.join(LEGACY_VERSION_FILE));
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PROJECT_FILE;
    use std::fs;
    use tempfile::TempDir;
    use tfkit::{FlagValue, Subcommand};

    fn project(tmp: &TempDir) -> Config {
        let stacks = tmp.path().join("stacks");
        for (stack, file) in [
            ("network", "main.tf"),
            ("dns", "versions.tf"),
            ("docs", "README.md"),
        ] {
            fs::create_dir_all(stacks.join(stack)).unwrap();
            fs::write(stacks.join(stack).join(file), "").unwrap();
        }
        fs::create_dir_all(stacks.join("network/modules/vpc")).unwrap();
        fs::write(stacks.join("network/modules/vpc/main.tf"), "").unwrap();
        fs::write(stacks.join("stray.tf"), "").unwrap();
        Config::load(&tmp.path().join(PROJECT_FILE)).unwrap()
    }

    #[test]
    fn test_discover() {
        let tmp = TempDir::new().unwrap();
        let config = project(&tmp);
        assert_eq!(discover(&config.base_path()), vec!["dns", "network"]);
    }

    #[test]
    fn test_discover_missing_base() {
        let tmp = TempDir::new().unwrap();
        assert!(discover(&tmp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_validate() {
        let known = vec!["dns".to_string(), "network".to_string()];
        assert_eq!(validate(&known, "network").as_deref(), Some("network"));
        assert_eq!(validate(&known, "stacks/network/").as_deref(), Some("network"));
        assert_eq!(validate(&known, "docs"), None);
    }

    #[test]
    fn test_select() {
        let tmp = TempDir::new().unwrap();
        let config = project(&tmp);
        assert_eq!(select(&config, &[]).unwrap(), vec!["dns", "network"]);
        assert_eq!(
            select(&config, &["network".into(), "stacks/network".into()]).unwrap(),
            vec!["network"]
        );
        let err = select(&config, &["docs".into()]).unwrap_err();
        assert!(err.to_string().contains("Stack not found: docs"));
    }

    #[test]
    fn test_context_applies_stack_layer() {
        let tmp = TempDir::new().unwrap();
        let config = project(&tmp);
        let dir = config.base_path().join("network");
        fs::write(
            dir.join(PROJECT_FILE),
            "[misc]\ndisable_color = true\n\n[terraform.plan]\nparallelism = 2\n",
        )
        .unwrap();

        let ctx = context(&config, "network").unwrap();
        assert_eq!(ctx.name, "network");
        assert_eq!(ctx.path, dir);
        assert_eq!(ctx.base_folder, "stacks");
        assert!(ctx.disable_color);
        assert!(ctx.options.autoinstall);
        assert_eq!(ctx.plan_file(), "network.tfout");
        assert_eq!(
            ctx.overrides[&Subcommand::Plan].get("parallelism"),
            Some(&FlagValue::Int(2))
        );
        assert_eq!(ctx.legacy_config, Some(dir.join(".terraform-version")));

        let dns = context(&config, "dns").unwrap();
        assert!(!dns.disable_color);
    }
}
