// src/remove.rs

//! Package removal
//!
//! Deletion is driven entirely by the installed manifest, which is
//! already reverse-sorted: files fall before the directories that held
//! them, so a single front-to-back walk is safe. Configuration under
//! `/etc` is left behind, shared directories survive because only empty
//! directories are removed, and the installed-db entry disappears as part
//! of the walk because the manifest lists it.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interrupt::{self, CriticalSection};
use crate::manifest;
use crate::package::PackageDef;
use crate::repository;
use crate::resolver::{self, ResolveMode};
use std::fs;
use tracing::{debug, info, warn};

/// Remove one installed package.
///
/// Unless `force` is set, removal is blocked while any other installed
/// package lists the target in its `depends` file.
pub fn remove(config: &Config, name: &str) -> Result<()> {
    repository::validate_name(name)?;
    let entry = config.installed_entry(name);
    if !entry.is_dir() {
        return Err(Error::NotInstalled(name.to_string()));
    }

    if config.force {
        debug!("{}: KISS_FORCE set, skipping dependent checks", name);
    } else {
        dependent_check(config, name)?;
    }

    info!("{}: removing package", name);
    let lines = manifest::read(&entry.join("manifest"))?;

    {
        let _guard = CriticalSection::enter();

        for line in &lines {
            if line.starts_with("/etc/") {
                continue;
            }
            let path = config.root.join(line.trim_start_matches('/'));

            if line.ends_with('/') {
                // Shared directories stay until their last owner goes.
                let _ = fs::remove_dir(&path);
                continue;
            }

            match path.symlink_metadata() {
                Ok(_) => {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("{}: failed to remove {}: {}", name, path.display(), e);
                    }
                }
                Err(_) => {}
            }
        }
    }

    info!("{}: removed successfully", name);
    Ok(())
}

/// Remove several packages, honoring dependency order.
///
/// The removal set is resolved like any other closure, then filtered back
/// down to the user-named roots and reversed: dependents go before the
/// packages they depend on, so the per-package dependent check passes
/// when the whole group is going away together.
pub fn remove_all(config: &Config, names: &[String]) -> Result<()> {
    for name in names {
        repository::validate_name(name)?;
        if !config.is_installed(name) {
            return Err(Error::NotInstalled(name.clone()));
        }
    }

    let resolution = resolver::resolve(config, names, ResolveMode::Remove)?;
    let mut ordered: Vec<&String> = resolution
        .order
        .iter()
        .filter(|n| names.contains(n))
        .collect();
    ordered.reverse();

    for name in ordered {
        if interrupt::pending() {
            return Err(Error::Interrupted);
        }
        remove(config, name)?;
    }
    Ok(())
}

/// Abort with every installed package whose `depends` file lists `name`.
///
/// Make-only dependents count too: unlike the install-side gate, which
/// only requires runtime dependencies to be present, any mention blocks
/// removal.
fn dependent_check(config: &Config, name: &str) -> Result<()> {
    let mut dependents = Vec::new();

    let Ok(entries) = fs::read_dir(config.installed_db()) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let other = entry.file_name().to_string_lossy().into_owned();
        if other == name {
            continue;
        }
        let def = PackageDef::new(other.clone(), entry.path());
        if def.depends().iter().any(|d| d.name == name) {
            dependents.push(other);
        }
    }

    if dependents.is_empty() {
        Ok(())
    } else {
        dependents.sort();
        Err(Error::RequiredBy {
            package: name.to_string(),
            dependents,
        })
    }
}
