// src/build/fixdeps.rs

//! Dynamic dependency fixup
//!
//! After a build, every ELF file in the stage is inspected for the shared
//! libraries it links against. Each referenced library is resolved to its
//! real path under the target root and matched against installed
//! manifests to find the owning package; owners are appended to the staged
//! `depends` file so hand-written dependency lists stay honest.
//!
//! Toolchain libraries every binary links against are blocklisted, as is
//! the package itself.

use crate::config::{Config, PKG_DB};
use crate::error::Result;
use goblin::elf::Elf;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Library directories searched under the target root, in order.
const LIB_DIRS: &[&str] = &["usr/lib", "usr/lib64", "lib", "lib64", "usr/local/lib"];

/// Sonames that never become dependencies.
const BLOCKLIST: &[&str] = &[
    "ld-linux",
    "ld-musl",
    "libc.so",
    "libc.musl",
    "libm.so",
    "libdl.so",
    "libpthread.so",
    "librt.so",
    "libgcc_s.so",
    "libstdc++.so",
];

fn blocklisted(soname: &str) -> bool {
    BLOCKLIST.iter().any(|b| soname.starts_with(b))
}

/// An installed package's manifest, loaded once per fixup pass.
struct InstalledManifest {
    name: String,
    paths: HashSet<String>,
}

fn load_installed_manifests(config: &Config) -> Vec<InstalledManifest> {
    let mut manifests = Vec::new();
    let Ok(entries) = fs::read_dir(config.installed_db()) else {
        return manifests;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(content) = fs::read_to_string(entry.path().join("manifest")) else {
            continue;
        };
        manifests.push(InstalledManifest {
            name,
            paths: content.lines().map(String::from).collect(),
        });
    }
    manifests
}

/// Resolve a soname to its manifest-style path under the target root.
///
/// Symlinks are followed so `libz.so.1` maps to the line the owning
/// manifest actually lists.
fn resolve_soname(config: &Config, soname: &str) -> Option<String> {
    let canonical_root = fs::canonicalize(&config.root).ok()?;
    for dir in LIB_DIRS {
        let candidate = config.root.join(dir).join(soname);
        if !candidate.exists() {
            continue;
        }
        let real = fs::canonicalize(&candidate).ok()?;
        let rel = real.strip_prefix(&canonical_root).ok()?;
        return Some(format!("/{}", rel.display()));
    }
    None
}

/// Dynamic library references of one ELF file.
fn needed_libraries(path: &Path) -> Option<Vec<String>> {
    let bytes = fs::read(path).ok()?;
    let elf = Elf::parse(&bytes).ok()?;
    Some(elf.libraries.iter().map(|l| l.to_string()).collect())
}

/// Detect the runtime dependencies of a staged package and merge them
/// into its staged `depends` file.
pub fn fix_depends(config: &Config, stage: &Path, name: &str) -> Result<()> {
    let manifests = load_installed_manifests(config);
    let mut owners: BTreeSet<String> = BTreeSet::new();

    for entry in WalkDir::new(stage).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(libs) = needed_libraries(entry.path()) else {
            continue;
        };
        for soname in libs {
            if blocklisted(&soname) {
                continue;
            }
            let Some(lib_path) = resolve_soname(config, &soname) else {
                debug!("{}: {} not found under target root", name, soname);
                continue;
            };
            match manifests.iter().find(|m| m.paths.contains(&lib_path)) {
                Some(owner) if owner.name != name => {
                    owners.insert(owner.name.clone());
                }
                Some(_) => {}
                None => warn!("{}: no installed package owns {}", name, lib_path),
            }
        }
    }

    if owners.is_empty() {
        return Ok(());
    }
    debug!("{}: detected dependencies: {:?}", name, owners);
    merge_depends(&stage.join(PKG_DB).join(name).join("depends"), &owners)
}

/// Merge detected dependencies into a `depends` file, sorted and unique
/// by first column.
fn merge_depends(path: &Path, detected: &BTreeSet<String>) -> Result<()> {
    let mut lines: Vec<String> = match fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => Vec::new(),
    };

    let existing: HashSet<String> = lines
        .iter()
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect();
    for dep in detected {
        if !existing.contains(dep) {
            lines.push(dep.clone());
        }
    }

    lines.sort();
    lines.dedup_by(|a, b| {
        a.split_whitespace().next() == b.split_whitespace().next()
    });

    let mut out = String::new();
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out)?;
    Ok(())
}
