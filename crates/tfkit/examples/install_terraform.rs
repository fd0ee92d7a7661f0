//! Example: Resolve and install a Terraform release
//!
//! Run with: cargo run -p tfkit --example install_terraform -- "~> 1.4.0"

use tfkit::{ManagerConfig, VersionManager};

fn main() {
    let constraint = std::env::args().nth(1).unwrap_or_else(|| ">= 1.0.0".to_string());

    println!("Terraform Installer");
    println!("===================\n");

    let manager = VersionManager::new(ManagerConfig::new());
    println!("Install dir: {}", manager.config().install_dir().display());

    let installed = manager.list();
    if installed.is_empty() {
        println!("Nothing installed yet.");
    } else {
        println!("Installed: {}", installed.join(", "));
    }

    let version = match manager.resolve(&constraint) {
        Ok(version) => version,
        Err(e) => {
            eprintln!("\nCould not resolve {}: {}", constraint, e);
            std::process::exit(1);
        }
    };
    println!("\n{} resolves to {}", constraint, version);

    match manager.install(&version) {
        Ok(path) => {
            println!("\nInstallation successful!");
            println!("  Version: {}", version);
            println!("  Path:    {}", path.display());
        }
        Err(e) => {
            eprintln!("\nInstallation failed: {}", e);
            eprintln!("  {}", e.category().advice());
            std::process::exit(1);
        }
    }
}
