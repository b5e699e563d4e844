// src/package.rs

//! Package definition metadata
//!
//! A package definition is a directory of small line-oriented files:
//! `version`, `sources`, `build`, `checksums`, optionally `depends` and
//! `post-install`, plus the `nostrip`/`nodepends` marker files. This module
//! parses those files into typed records and provides the installed-db
//! listing that several operations share.

use crate::config::Config;
use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Package version and release, from the two fields of the `version` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub release: String,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.version, self.release)
    }
}

/// One line of the `sources` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// URL (contains `://`) or path relative to the package definition
    pub src: String,
    /// Destination subdirectory under the build root; empty by default
    pub dest: String,
}

impl Source {
    /// Whether the source is fetched over the network.
    pub fn is_url(&self) -> bool {
        self.src.contains("://")
    }

    /// The filename a fetched or local source is stored under.
    pub fn basename(&self) -> &str {
        self.src.rsplit('/').next().unwrap_or(&self.src)
    }
}

/// Dependency kind from the optional second field of a `depends` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// Needed at runtime; gates installation
    Runtime,
    /// Needed only to build
    Make,
}

/// One line of the `depends` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub kind: DepKind,
}

/// A handle to a package definition on disk.
#[derive(Debug, Clone)]
pub struct PackageDef {
    pub name: String,
    pub path: PathBuf,
}

impl PackageDef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Parse the `version` file: one line, `<version> <release>`.
    pub fn version(&self) -> Result<Version> {
        read_version(&self.name, &self.path)
    }

    /// Parse the `sources` file. A missing file means no sources.
    pub fn sources(&self) -> Result<Vec<Source>> {
        let path = self.path.join("sources");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::IoError(format!("{}: {}", path.display(), e)))?;
        Ok(parse_sources(&content))
    }

    /// Parse the `depends` file. Missing or unreadable means no
    /// dependencies.
    pub fn depends(&self) -> Vec<Dependency> {
        match fs::read_to_string(self.path.join("depends")) {
            Ok(content) => parse_depends(&content),
            Err(_) => Vec::new(),
        }
    }

    /// Stored checksum lines, in `sources` order.
    pub fn checksums(&self) -> Result<Vec<String>> {
        let path = self.path.join("checksums");
        let content = fs::read_to_string(&path)
            .map_err(|_| Error::MissingChecksums(vec![self.name.clone()]))?;
        Ok(content.lines().map(str::trim).map(String::from).collect())
    }

    /// Whether a marker file (`nostrip`, `nodepends`) is present.
    pub fn has_marker(&self, marker: &str) -> bool {
        self.path.join(marker).exists()
    }

    /// Assert the definition is complete enough to build.
    pub fn lint(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(Error::InvalidMetadata {
                package: self.name.clone(),
                reason: reason.to_string(),
            })
        };

        if !self.path.join("sources").exists() {
            return fail("sources file not found");
        }

        let build = self.path.join("build");
        match fs::metadata(&build) {
            Ok(meta) if meta.permissions().mode() & 0o111 != 0 => {}
            Ok(_) => return fail("build file is not executable"),
            Err(_) => return fail("build file not found"),
        }

        self.version()?;
        Ok(())
    }
}

/// Parse a `version` file at an arbitrary definition path.
pub fn read_version(name: &str, def_path: &Path) -> Result<Version> {
    let path = def_path.join("version");
    let content = fs::read_to_string(&path).map_err(|_| Error::InvalidMetadata {
        package: name.to_string(),
        reason: "version file not found".to_string(),
    })?;

    let mut fields = content.split_whitespace();
    let version = fields.next().unwrap_or_default();
    let release = fields.next().unwrap_or_default();

    if version.is_empty() {
        return Err(Error::InvalidMetadata {
            package: name.to_string(),
            reason: "version field is empty".to_string(),
        });
    }
    if release.is_empty() {
        return Err(Error::InvalidMetadata {
            package: name.to_string(),
            reason: "release field is empty".to_string(),
        });
    }

    Ok(Version {
        version: version.to_string(),
        release: release.to_string(),
    })
}

fn parse_sources(content: &str) -> Vec<Source> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let mut fields = line.split_whitespace();
            Source {
                src: fields.next().unwrap_or_default().to_string(),
                dest: fields.next().unwrap_or_default().to_string(),
            }
        })
        .collect()
}

fn parse_depends(content: &str) -> Vec<Dependency> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next().unwrap_or_default().to_string();
            let kind = match fields.next() {
                Some("make") => DepKind::Make,
                _ => DepKind::Runtime,
            };
            Dependency { name, kind }
        })
        .collect()
}

/// List installed packages with their versions.
///
/// An empty `names` slice enumerates the whole installed database, sorted
/// by name. A non-empty slice verifies each name and fails with
/// [`Error::NotInstalled`] on the first missing one; wildcard characters
/// are rejected up front, only `search` accepts patterns.
pub fn list_installed(config: &Config, names: &[String]) -> Result<Vec<(String, Version)>> {
    let db = config.installed_db();

    let names: Vec<String> = if names.is_empty() {
        let mut all = Vec::new();
        if let Ok(entries) = fs::read_dir(&db) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    all.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        all.sort();
        all
    } else {
        for name in names {
            crate::repository::validate_name(name)?;
        }
        names.to_vec()
    };

    let mut listed = Vec::new();
    for name in names {
        let entry = db.join(&name);
        if !entry.is_dir() {
            return Err(Error::NotInstalled(name));
        }
        let version = read_version(&name, &entry)?;
        listed.push((name, version));
    }
    Ok(listed)
}

/// Installed version of a single package.
pub fn installed_version(config: &Config, name: &str) -> Result<Version> {
    let entry = config.installed_entry(name);
    if !entry.is_dir() {
        return Err(Error::NotInstalled(name.to_string()));
    }
    read_version(name, &entry)
}
