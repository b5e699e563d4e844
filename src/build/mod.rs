// src/build/mod.rs

//! The build pipeline and driver
//!
//! For each package in resolved order the pipeline runs a single pass:
//! extract sources, invoke the package's `build` script against a fresh
//! stage, mirror the definition into the staged installed-db entry, strip
//! binaries, detect dynamic dependencies, prune junk paths, generate the
//! manifest and archive the stage into the binary cache.
//!
//! The driver in [`build`] front-loads all validation: every package is
//! linted, every source fetched and every checksum verified before the
//! first build script runs. Missing checksum files and mismatches are
//! collected across the whole set so one run reports the complete list.

pub mod extract;
pub mod fixdeps;
pub mod strip;
pub mod tarball;

pub use strip::{ElfClass, StripTool, SystemStrip};

use crate::cache::Cache;
use crate::config::{Config, PKG_DB};
use crate::error::{Error, Result};
use crate::install;
use crate::interrupt;
use crate::manifest;
use crate::package::{PackageDef, Version};
use crate::repository;
use crate::resolver::{self, ResolveMode};
use crate::source::{self, Downloader};
use std::fs::{self, OpenOptions};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Everything a build pass needs, threaded explicitly; the pipeline keeps
/// no global state.
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub cache: &'a Cache,
    pub downloader: &'a dyn Downloader,
    pub strip: &'a dyn StripTool,
    /// Update runs install every package right after its build, explicit
    /// or not, so later builds link against the fresh versions.
    pub update: bool,
}

/// Build `roots` and their missing dependencies in dependency order.
pub fn build(ctx: &BuildContext<'_>, roots: &[String]) -> Result<()> {
    for name in roots {
        repository::validate_name(name)?;
    }

    let resolution = resolver::resolve(ctx.config, roots, ResolveMode::Build)?;
    let order = resolution.build_order();
    if order.is_empty() {
        info!("nothing to build");
        return Ok(());
    }
    info!("build order: {}", order.join(" "));

    let mut defs = Vec::new();
    for name in &order {
        let path = repository::find(ctx.config, name)?;
        defs.push(PackageDef::new(name.clone(), path));
    }

    for def in &defs {
        def.lint()?;
    }

    // All checksum files must exist before anything is fetched; report
    // every missing one at once.
    let mut missing = Vec::new();
    for def in &defs {
        if !def.sources()?.is_empty() && !def.path.join("checksums").exists() {
            missing.push(def.name.clone());
        }
    }
    if !missing.is_empty() {
        return Err(Error::MissingChecksums(missing));
    }

    for def in &defs {
        source::fetch(ctx.cache, ctx.downloader, def)?;
    }

    // Verification likewise batches mismatches across the whole set.
    let mut mismatched = Vec::new();
    for def in &defs {
        if def.sources()?.is_empty() {
            continue;
        }
        match source::verify_checksums(ctx.cache, def) {
            Ok(()) => {}
            Err(Error::ChecksumMismatch(_)) => mismatched.push(def.name.clone()),
            Err(e) => return Err(e),
        }
    }
    if !mismatched.is_empty() {
        return Err(Error::ChecksumMismatch(mismatched));
    }

    for def in &defs {
        if interrupt::pending() {
            return Err(Error::Interrupted);
        }

        let version = def.version()?;
        let tarball = ctx
            .cache
            .tarball(&def.name, &version.version, &version.release);
        let explicit = resolution.is_explicit(&def.name);

        // A dependency with a matching pre-built tarball skips its build.
        if tarball.exists() && !explicit {
            info!("{}: found pre-built tarball, installing", def.name);
            install::install_tarball(ctx.config, ctx.cache, &tarball)?;
            continue;
        }

        build_package(ctx, def, &version)?;

        // Dependencies are installed right away so later packages in the
        // order can link against them. Explicit roots are only installed
        // here during an update.
        if !explicit || ctx.update {
            install::install_tarball(ctx.config, ctx.cache, &tarball)?;
        }
    }

    Ok(())
}

/// Run the eight-step pipeline for one package.
pub fn build_package(ctx: &BuildContext<'_>, def: &PackageDef, version: &Version) -> Result<()> {
    info!("{}: building version {}", def.name, version);

    let build_dir = ctx.cache.build_dir(&def.name);
    let stage_dir = ctx.cache.stage_dir(&def.name);
    for dir in [&build_dir, &stage_dir] {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
    }

    extract::extract_sources(ctx.cache, def)?;
    run_build_script(ctx.config, def, &build_dir, &stage_dir)?;

    // The staged copy of the definition is what becomes the installed-db
    // entry.
    extract::copy_tree(&def.path, &stage_dir.join(PKG_DB).join(&def.name))?;

    if def.has_marker("nostrip") {
        debug!("{}: nostrip marker present, skipping strip", def.name);
    } else {
        strip::strip_stage(&stage_dir, ctx.strip)?;
    }

    if def.has_marker("nodepends") {
        debug!("{}: nodepends marker present, skipping fixup", def.name);
    } else {
        fixdeps::fix_depends(ctx.config, &stage_dir, &def.name)?;
    }

    prune_junk(ctx.config, &stage_dir);
    manifest::write_for_stage(&stage_dir, &def.name)?;
    tarball::create(
        &stage_dir,
        &ctx.cache
            .tarball(&def.name, &version.version, &version.release),
    )?;

    info!("{}: successfully built {}", def.name, version);
    Ok(())
}

fn run_build_script(
    config: &Config,
    def: &PackageDef,
    build_dir: &std::path::Path,
    stage_dir: &std::path::Path,
) -> Result<()> {
    let script = fs::canonicalize(def.path.join("build"))?;
    let stage = fs::canonicalize(stage_dir)?;

    let mut cmd = Command::new(&script);
    cmd.arg(&stage).current_dir(build_dir);

    if let Some(log) = &config.build_log {
        let file = OpenOptions::new().create(true).append(true).open(log)?;
        cmd.stdout(Stdio::from(file.try_clone()?));
        cmd.stderr(Stdio::from(file));
    }

    let status = cmd.status().map_err(|e| {
        Error::IoError(format!("{}: failed to run build script: {}", def.name, e))
    })?;
    if !status.success() {
        return Err(Error::BuildFailed(def.name.clone()));
    }
    Ok(())
}

/// Delete the configured junk paths from a stage. Absent paths are fine.
fn prune_junk(config: &Config, stage: &std::path::Path) {
    for junk in &config.junk {
        let path = stage.join(junk);
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        debug!("pruning {}", path.display());
        let _ = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
    }
}
