// src/install.rs

//! Package installation
//!
//! Installs a staged tarball against the target root. The procedure is
//! deliberately ordered: everything that can fail (conflict check,
//! dependency gate) happens before the first byte of the target root is
//! touched, and the filesystem mutation itself runs inside a critical
//! section with interruptions blocked.
//!
//! Upgrades are incremental rather than transactional: during the copy
//! the target root holds a superset of the old and new file sets, then
//! paths only the old manifest listed are pruned. Configuration under
//! `/etc` is never overwritten and never deleted.

use crate::cache::Cache;
use crate::config::{Config, PKG_DB};
use crate::error::{Error, Result};
use crate::interrupt::CriticalSection;
use crate::manifest;
use crate::package::{DepKind, PackageDef};
use crate::repository;
use flate2::read::GzDecoder;
use nix::unistd::{self, Gid, Uid};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Paths never deleted during leftover pruning: losing the shell, the
/// remove tool or the copy tool mid-upgrade would brick a live system.
const CRITICAL: &[&str] = &[
    "/bin/sh",
    "/bin/rm",
    "/bin/cp",
    "/usr/bin/sh",
    "/usr/bin/rm",
    "/usr/bin/cp",
];

/// Install a package by name or tarball path.
pub fn install(config: &Config, cache: &Cache, target: &str) -> Result<()> {
    let path = Path::new(target);
    if target.ends_with(".tar.gz") {
        if path.is_file() {
            return install_tarball(config, cache, path);
        }
        return Err(Error::NotFound(target.to_string()));
    }

    repository::validate_name(target)?;
    let def = PackageDef::new(target, repository::find(config, target)?);
    let version = def.version()?;
    let tarball = cache.tarball(target, &version.version, &version.release);
    if !tarball.is_file() {
        return Err(Error::NotBuilt(target.to_string()));
    }
    install_tarball(config, cache, &tarball)
}

/// Install a specific staged tarball.
pub fn install_tarball(config: &Config, cache: &Cache, tarball: &Path) -> Result<()> {
    let name = contained_package(tarball)?;
    info!("{}: installing {}", name, tarball.display());

    let new_manifest = packaged_manifest(tarball, &name)?;
    conflict_check(config, &name, &new_manifest)?;

    // Stage the archive fully before touching the target root.
    let extract_dir = cache.extract_dir(&name);
    if extract_dir.exists() {
        fs::remove_dir_all(&extract_dir)?;
    }
    fs::create_dir_all(&extract_dir)?;
    let mut archive = Archive::new(GzDecoder::new(File::open(tarball)?));
    archive.set_preserve_permissions(true);
    archive.set_unpack_xattrs(true);
    archive
        .unpack(&extract_dir)
        .map_err(|e| Error::IoError(format!("{}: extracting archive: {}", name, e)))?;

    if config.force {
        debug!("{}: KISS_FORCE set, skipping dependency checks", name);
    } else {
        dependency_gate(config, &extract_dir, &name)?;
    }

    // The old manifest (upgrade case) drives leftover pruning later.
    let installed_manifest = config.installed_entry(&name).join("manifest");
    let old_manifest = if installed_manifest.is_file() {
        Some(manifest::read(&installed_manifest)?)
    } else {
        None
    };

    {
        let _guard = CriticalSection::enter();

        mirror(&extract_dir, &config.root)?;
        mirror_etc(&extract_dir, &config.root)?;

        if let Some(old) = &old_manifest {
            prune_leftovers(config, old, &new_manifest);

            // A path in both manifests can resolve to the same inode and
            // be lost to the prune; two tolerant re-mirrors restore it.
            for _ in 0..2 {
                if let Err(e) = mirror(&extract_dir, &config.root) {
                    warn!("{}: re-mirror after prune: {}", name, e);
                }
                if let Err(e) = mirror_etc(&extract_dir, &config.root) {
                    warn!("{}: re-mirror after prune: {}", name, e);
                }
            }
        }
    }

    run_post_install(config, &name);
    info!("{}: installed successfully", name);
    Ok(())
}

/// Find the package name inside a tarball by its installed-db `version`
/// entry.
fn contained_package(tarball: &Path) -> Result<String> {
    let invalid = || Error::InvalidPackage(tarball.display().to_string());

    let mut archive = Archive::new(GzDecoder::new(File::open(tarball)?));
    for entry in archive.entries().map_err(|_| invalid())? {
        let entry = entry.map_err(|_| invalid())?;
        let path = entry.path().map_err(|_| invalid())?.into_owned();
        if let Some(name) = db_entry_file(&path, "version") {
            return Ok(name);
        }
    }
    Err(invalid())
}

/// Read the packaged manifest out of the tarball without extracting it.
fn packaged_manifest(tarball: &Path, name: &str) -> Result<Vec<String>> {
    let mut archive = Archive::new(GzDecoder::new(File::open(tarball)?));
    for entry in archive
        .entries()
        .map_err(|e| Error::IoError(format!("{}: reading archive: {}", name, e)))?
    {
        let mut entry = entry.map_err(|e| Error::IoError(format!("{}: {}", name, e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::IoError(format!("{}: {}", name, e)))?
            .into_owned();
        if db_entry_file(&path, "manifest").as_deref() == Some(name) {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(content.lines().map(String::from).collect());
        }
    }
    Err(Error::InvalidPackage(tarball.display().to_string()))
}

/// Match `[./]var/db/kiss/installed/<name>/<file>` and return the name.
fn db_entry_file(path: &Path, file: &str) -> Option<String> {
    let mut parts = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>();
    if parts.len() != 6 {
        return None;
    }
    let tail = parts.split_off(4);
    if parts.join("/") == PKG_DB && tail[1] == file {
        Some(tail[0].to_string())
    } else {
        None
    }
}

/// Abort if any file in the new manifest is owned by a different
/// installed package.
///
/// Directory lines are shared by design and never conflict. Each path is
/// also compared in its symlink-resolved form so `/usr/sbin/foo` clashes
/// with `/usr/bin/foo` on a merged-usr root.
fn conflict_check(config: &Config, name: &str, new_manifest: &[String]) -> Result<()> {
    let mut candidates: HashSet<String> = HashSet::new();
    for line in new_manifest {
        if line.ends_with('/') {
            continue;
        }
        if let Some(resolved) = resolve_under_root(config, line) {
            candidates.insert(resolved);
        }
        candidates.insert(line.clone());
    }

    let mut conflicts = Vec::new();
    let Ok(entries) = fs::read_dir(config.installed_db()) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let other = entry.file_name().to_string_lossy().into_owned();
        if other == name {
            continue;
        }
        let Ok(lines) = manifest::read(&entry.path().join("manifest")) else {
            continue;
        };
        for line in lines {
            if !line.ends_with('/') && candidates.contains(&line) {
                conflicts.push(format!("{line} ({other})"));
            }
        }
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        conflicts.sort();
        Err(Error::Conflict {
            package: name.to_string(),
            paths: conflicts,
        })
    }
}

/// Resolve a manifest path through any symlinked parent directories on
/// the live target root. Returns `None` when nothing resolves differently.
fn resolve_under_root(config: &Config, line: &str) -> Option<String> {
    let rel = line.trim_start_matches('/');
    let parent = Path::new(rel).parent()?;
    let file = Path::new(rel).file_name()?;

    let canonical_root = fs::canonicalize(&config.root).ok()?;
    let real_parent = fs::canonicalize(config.root.join(parent)).ok()?;
    let resolved = format!(
        "/{}",
        real_parent
            .strip_prefix(&canonical_root)
            .ok()?
            .join(file)
            .display()
    );
    (resolved != line).then_some(resolved)
}

/// Require every runtime dependency of the staged package to be
/// installed.
fn dependency_gate(config: &Config, extract_dir: &Path, name: &str) -> Result<()> {
    let staged = PackageDef::new(name, extract_dir.join(PKG_DB).join(name));
    let missing: Vec<String> = staged
        .depends()
        .into_iter()
        .filter(|d| d.kind == DepKind::Runtime)
        .map(|d| d.name)
        .filter(|dep| !config.is_installed(dep))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingDeps {
            package: name.to_string(),
            deps: missing,
        })
    }
}

/// Mirror the stage into the target root, excluding `/etc`, overwriting
/// existing files in place.
fn mirror(stage: &Path, root: &Path) -> Result<()> {
    mirror_tree(stage, root, true, false)
}

/// Mirror the staged `/etc` with ignore-existing semantics: a config file
/// the user already has is never replaced.
fn mirror_etc(stage: &Path, root: &Path) -> Result<()> {
    let etc = stage.join("etc");
    if !etc.is_dir() {
        return Ok(());
    }
    mirror_tree(&etc, &root.join("etc"), false, true)
}

fn mirror_tree(src: &Path, dest: &Path, skip_etc: bool, ignore_existing: bool) -> Result<()> {
    let as_root = unistd::geteuid().is_root();
    // First destination of each multiply-linked source inode, so hard
    // link groups stay linked on the target.
    let mut linked: HashMap<(u64, u64), PathBuf> = HashMap::new();

    fs::create_dir_all(dest)?;

    let mut walker = WalkDir::new(src).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| Error::IoError(format!("walking stage: {e}")))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::IoError(format!("stage path escape: {e}")))?;

        if skip_etc && rel == Path::new("etc") && entry.file_type().is_dir() {
            walker.skip_current_dir();
            continue;
        }

        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if !target.is_dir() {
                fs::create_dir_all(&target)?;
            }
            apply_metadata(entry.path(), &target, as_root)?;
        } else if file_type.is_symlink() {
            if target.symlink_metadata().is_ok() {
                if ignore_existing {
                    continue;
                }
                let existing = target.symlink_metadata()?;
                if existing.is_dir() {
                    // Never replace a populated directory with a link.
                    continue;
                }
                fs::remove_file(&target)?;
            }
            symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            if ignore_existing && target.symlink_metadata().is_ok() {
                continue;
            }

            let meta = entry.metadata().map_err(|e| {
                Error::IoError(format!("{}: {}", entry.path().display(), e))
            })?;
            if meta.nlink() > 1 {
                let key = (meta.dev(), meta.ino());
                if let Some(first) = linked.get(&key) {
                    let _ = fs::remove_file(&target);
                    fs::hard_link(first, &target)?;
                    continue;
                }
                linked.insert(key, target.clone());
            }

            copy_file_atomic(entry.path(), &target)?;
            apply_metadata(entry.path(), &target, as_root)?;
        }
    }
    Ok(())
}

/// Copy via a temp file in the destination directory, then rename over
/// the target. A live binary is replaced in one step and never truncated
/// in place.
fn copy_file_atomic(src: &Path, dest: &Path) -> Result<()> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| Error::IoError(format!("bad destination {}", dest.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".kiss-tmp");
    let tmp = dest.with_file_name(tmp_name);

    // The destination may currently be a symlink; remove it so the rename
    // replaces the link itself, not its target.
    if let Ok(meta) = dest.symlink_metadata() {
        if meta.is_symlink() {
            fs::remove_file(dest)?;
        }
    }

    fs::copy(src, &tmp)
        .map_err(|e| Error::IoError(format!("copying to {}: {}", dest.display(), e)))?;
    fs::rename(&tmp, dest)
        .map_err(|e| Error::IoError(format!("renaming into {}: {}", dest.display(), e)))?;
    Ok(())
}

/// Carry permissions (always) and ownership (when running as root) from
/// the stage to the target.
fn apply_metadata(src: &Path, dest: &Path, as_root: bool) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;
    fs::set_permissions(dest, fs::Permissions::from_mode(meta.mode()))?;
    if as_root {
        unistd::chown(
            dest,
            Some(Uid::from_raw(meta.uid())),
            Some(Gid::from_raw(meta.gid())),
        )
        .map_err(|e| Error::IoError(format!("chown {}: {}", dest.display(), e)))?;
    }
    Ok(())
}

/// Delete paths only the old manifest listed.
///
/// `/etc` and the critical-executable set are skipped; directories are
/// removed only when empty; symlinks to directories are left alone.
fn prune_leftovers(config: &Config, old: &[String], new: &[String]) {
    for line in manifest::difference(old, new) {
        if line.starts_with("/etc/") {
            continue;
        }
        if CRITICAL.contains(&line.as_str()) {
            continue;
        }

        let path = config.root.join(line.trim_start_matches('/'));
        if line.ends_with('/') {
            // Non-empty directories are still shared with other packages.
            let _ = fs::remove_dir(&path);
            continue;
        }

        match path.symlink_metadata() {
            Ok(meta) if meta.is_symlink() => {
                // A symlink that currently points at a directory may be
                // load-bearing (`/usr/sbin` -> `usr/bin`); leave it.
                if path.metadata().map(|m| m.is_dir()).unwrap_or(false) {
                    debug!("leaving directory symlink {}", path.display());
                    continue;
                }
                let _ = fs::remove_file(&path);
            }
            Ok(_) => {
                let _ = fs::remove_file(&path);
            }
            Err(_) => {}
        }
    }
}

/// Run the package's `post-install`, if any. Failure is reported but
/// never fails the install.
fn run_post_install(config: &Config, name: &str) {
    let hook = config.installed_entry(name).join("post-install");
    let executable = fs::metadata(&hook)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false);
    if !executable {
        return;
    }

    info!("{}: running post-install", name);
    match Command::new(&hook).current_dir(&config.root).output() {
        Ok(output) => {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                info!("{}: post-install: {}", name, line);
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!("{}: post-install: {}", name, line);
            }
            if !output.status.success() {
                warn!("{}: post-install exited with {}", name, output.status);
            }
        }
        Err(e) => warn!("{}: failed to run post-install: {}", name, e),
    }
}
