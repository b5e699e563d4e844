// src/update.rs

//! System update
//!
//! Compares every installed package against its repository definition and
//! rebuilds whatever differs, in dependency order, installing each package
//! immediately after its build so later builds link against the fresh
//! versions.
//!
//! The manager updating itself is special-cased: it is built and
//! installed alone, then the freshly installed binary is exec'd to finish
//! the update, so a partially stale manager never drives the rest of the
//! system.

use crate::build::{self, BuildContext};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::{self, Version};
use crate::repository;
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::{info, warn};

/// The manager's own package name, for the self-update carve-out.
const SELF_PACKAGE: &str = env!("CARGO_PKG_NAME");

/// One outdated package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outdated {
    pub name: String,
    pub installed: Version,
    pub available: Version,
}

/// Compare installed packages against the repositories.
///
/// Packages that no longer exist in any repository are skipped with a
/// warning.
pub fn outdated(config: &Config) -> Result<Vec<Outdated>> {
    let mut stale = Vec::new();

    for (name, installed) in package::list_installed(config, &[])? {
        let repo_def = match repository::find_in_repos(config, &name) {
            Ok(path) => path,
            Err(Error::NotFound(_)) => {
                warn!("{}: not in any repository, skipping", name);
                continue;
            }
            Err(e) => return Err(e),
        };
        let available = package::read_version(&name, &repo_def)?;
        if available != installed {
            stale.push(Outdated {
                name,
                installed,
                available,
            });
        }
    }
    Ok(stale)
}

/// What an update pass decided to do.
pub enum UpdatePlan {
    /// Everything matches the repositories.
    UpToDate,
    /// The manager itself was rebuilt and re-installed; the caller should
    /// exec the new binary (or re-run) before updating anything else.
    SelfUpdated,
    /// The listed packages were rebuilt and installed.
    Updated(Vec<Outdated>),
}

/// Update the system.
pub fn update(ctx: &BuildContext<'_>) -> Result<UpdatePlan> {
    let stale = outdated(ctx.config)?;
    if stale.is_empty() {
        return Ok(UpdatePlan::UpToDate);
    }

    for pkg in &stale {
        info!(
            "{}: {} -> {}",
            pkg.name, pkg.installed, pkg.available
        );
    }

    // Never update the rest of the system with a stale manager.
    if stale.iter().any(|p| p.name == SELF_PACKAGE) {
        info!("updating {} first", SELF_PACKAGE);
        build::build(ctx, &[SELF_PACKAGE.to_string()])?;
        return Ok(UpdatePlan::SelfUpdated);
    }

    let names: Vec<String> = stale.iter().map(|p| p.name.clone()).collect();
    build::build(ctx, &names)?;
    Ok(UpdatePlan::Updated(stale))
}

/// Replace this process with the freshly installed manager binary.
///
/// Only returns on failure; the caller falls back to telling the user to
/// re-run by hand.
pub fn exec_new_manager(config: &Config) -> std::io::Error {
    let binary = config.root.join("usr/bin").join(SELF_PACKAGE);
    info!("continuing update with {}", binary.display());
    Command::new(binary).arg("update").exec()
}
