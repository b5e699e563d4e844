// src/commands.rs
//! Command handlers for the kiss CLI

use anyhow::{bail, Result};
use kiss::build::{self, BuildContext, SystemStrip};
use kiss::resolver::{self, ResolveMode};
use kiss::update::UpdatePlan;
use kiss::{install, package, remove, repository, source, update};
use kiss::{Cache, Config, HttpDownloader, PackageDef};
use tracing::warn;

/// Build packages (or every installed package when none are named).
pub fn cmd_build(packages: &[String]) -> Result<()> {
    let config = Config::from_env();
    let cache = Cache::new(&config)?;

    let roots = if packages.is_empty() {
        package::list_installed(&config, &[])?
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    } else {
        packages.to_vec()
    };
    if roots.is_empty() {
        println!("nothing to build");
        return Ok(());
    }

    // Echo the full plan so implicit dependencies are visible up front.
    let resolution = resolver::resolve(&config, &roots, ResolveMode::Build)?;
    println!("building: {}", resolution.build_order().join(" "));

    let downloader = HttpDownloader::new()?;
    let ctx = BuildContext {
        config: &config,
        cache: &cache,
        downloader: &downloader,
        strip: &SystemStrip,
        update: false,
    };
    build::build(&ctx, &roots)?;
    Ok(())
}

/// Regenerate `checksums` files from fetched sources.
pub fn cmd_checksum(packages: &[String]) -> Result<()> {
    let config = Config::from_env();
    let cache = Cache::new(&config)?;
    let downloader = HttpDownloader::new()?;

    for name in packages {
        let def = PackageDef::new(name.clone(), repository::find(&config, name)?);
        source::fetch(&cache, &downloader, &def)?;
        let sums = source::generate_checksums(&cache, &def)?;
        if sums.is_empty() {
            println!("{name}: no sources, no checksums needed");
            continue;
        }
        source::write_checksums(&def, &sums)?;
        for (sum, src) in sums.iter().zip(def.sources()?) {
            println!("{sum}  {}", src.basename());
        }
    }
    Ok(())
}

/// Install packages by name or tarball path.
pub fn cmd_install(targets: &[String]) -> Result<()> {
    let config = Config::from_env();
    require_root(&config, "install")?;
    let cache = Cache::new(&config)?;

    for target in targets {
        if kiss::interrupt::pending() {
            anyhow::bail!("interrupted");
        }
        install::install(&config, &cache, target)?;
        println!("installed {target}");
    }
    Ok(())
}

/// List installed packages, verifying any that were named.
pub fn cmd_list(packages: &[String]) -> Result<()> {
    let config = Config::from_env();
    for (name, version) in package::list_installed(&config, packages)? {
        println!("{name} {} {}", version.version, version.release);
    }
    Ok(())
}

/// Remove installed packages.
pub fn cmd_remove(packages: &[String]) -> Result<()> {
    let config = Config::from_env();
    require_root(&config, "remove")?;

    remove::remove_all(&config, packages)?;
    for name in packages {
        println!("removed {name}");
    }
    Ok(())
}

/// Print every repository path matching each pattern.
pub fn cmd_search(patterns: &[String]) -> Result<()> {
    let config = Config::from_env();
    for pattern in patterns {
        for hit in repository::search(&config, pattern)? {
            println!("{}", hit.display());
        }
    }
    Ok(())
}

/// Rebuild and install everything that differs from the repositories.
pub fn cmd_update() -> Result<()> {
    let config = Config::from_env();
    require_root(&config, "update")?;
    let cache = Cache::new(&config)?;
    let downloader = HttpDownloader::new()?;

    let ctx = BuildContext {
        config: &config,
        cache: &cache,
        downloader: &downloader,
        strip: &SystemStrip,
        update: true,
    };

    match update::update(&ctx)? {
        UpdatePlan::UpToDate => println!("everything is up to date"),
        UpdatePlan::Updated(stale) => {
            println!("updated {} package(s)", stale.len());
        }
        UpdatePlan::SelfUpdated => {
            // Hand the rest of the update to the new binary; exec only
            // returns on failure.
            let err = update::exec_new_manager(&config);
            warn!("failed to exec new manager: {}", err);
            println!("package manager updated; re-run 'kiss update' to continue");
        }
    }
    Ok(())
}

/// Mutating the live root wants real privileges; a redirected root is a
/// fake-root workflow and exempt.
fn require_root(config: &Config, action: &str) -> Result<()> {
    if config.root == std::path::Path::new("/") && !nix::unistd::geteuid().is_root() {
        bail!("{action} requires root privileges");
    }
    Ok(())
}
