// src/main.rs
//! kiss - CLI entry point

use clap::{Parser, Subcommand};
use std::process;

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "kiss")]
#[command(version)]
#[command(about = "Source-based package manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// Build packages and their missing dependencies
    #[command(visible_alias = "b")]
    Build {
        /// Packages to build; empty rebuilds every installed package
        packages: Vec<String>,
    },

    /// Generate checksums files from fetched sources
    #[command(visible_alias = "c")]
    Checksum {
        /// Packages to generate checksums for
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Install built packages
    #[command(visible_alias = "i")]
    Install {
        /// Package names or .tar.gz paths
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// List installed packages
    #[command(visible_alias = "l")]
    List {
        /// Packages to verify; empty lists everything
        packages: Vec<String>,
    },

    /// Remove installed packages
    #[command(visible_alias = "r")]
    Remove {
        /// Packages to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Search repositories for packages
    #[command(visible_alias = "s")]
    Search {
        /// Shell-style patterns
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Update outdated installed packages
    #[command(visible_alias = "u")]
    Update,

    /// Print the manager version
    #[command(visible_alias = "v")]
    Version,
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    kiss::interrupt::install_handler();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Action::Build { packages }) => commands::cmd_build(&packages),
        Some(Action::Checksum { packages }) => commands::cmd_checksum(&packages),
        Some(Action::Install { packages }) => commands::cmd_install(&packages),
        Some(Action::List { packages }) => commands::cmd_list(&packages),
        Some(Action::Remove { packages }) => commands::cmd_remove(&packages),
        Some(Action::Search { patterns }) => commands::cmd_search(&patterns),
        Some(Action::Update) => commands::cmd_update(),
        Some(Action::Version) => {
            println!("kiss {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            println!("kiss {}", env!("CARGO_PKG_VERSION"));
            println!("Run 'kiss --help' for usage information");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
