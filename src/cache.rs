// src/cache.rs

//! Cache layout and scratch-directory lifecycle
//!
//! Two kinds of directory live under the cache root:
//!
//! - Shared, append-mostly caches that survive between invocations:
//!   `sources/<name>/` for fetched source files and `bin/` for built
//!   package tarballs.
//! - Per-invocation scratch trees keyed on the process id (or `KISS_PID`):
//!   `build-<pid>/`, `pkg-<pid>/` and `extract-<pid>/`. These are created
//!   on construction and removed when the [`Cache`] drops, on success and
//!   on error alike, unless debug mode asks to keep them.
//!
//! Concurrent invocations never share a scratch tree; the shared caches are
//! safe under concurrent reads and a racing fetch of the same source file
//! produces the same bytes.

use crate::config::Config;
use crate::error::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Cache directories for one invocation
#[derive(Debug)]
pub struct Cache {
    /// Shared source cache: `sources/<name>/<file>`
    pub sources: PathBuf,
    /// Shared binary cache: `bin/<name>#<version>-<release>.tar.gz`
    pub bin: PathBuf,
    /// Per-invocation build trees: `build-<pid>/<name>/`
    pub build: PathBuf,
    /// Per-invocation package stages: `pkg-<pid>/<name>/`
    pub pkg: PathBuf,
    /// Per-invocation tarball extraction root: `extract-<pid>/<name>/`
    pub extract: PathBuf,
    keep: bool,
}

impl Cache {
    /// Create the cache layout for this invocation.
    pub fn new(config: &Config) -> Result<Self> {
        let root = &config.cache_root;
        let cache = Self {
            sources: root.join("sources"),
            bin: root.join("bin"),
            build: root.join(format!("build-{}", config.pid)),
            pkg: root.join(format!("pkg-{}", config.pid)),
            extract: root.join(format!("extract-{}", config.pid)),
            keep: config.debug,
        };

        for dir in [
            &cache.sources,
            &cache.bin,
            &cache.build,
            &cache.pkg,
            &cache.extract,
        ] {
            fs::create_dir_all(dir)?;
        }

        debug!("scratch directories created under {}", root.display());
        Ok(cache)
    }

    /// Source cache directory for one package.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.sources.join(name)
    }

    /// Build tree for one package.
    pub fn build_dir(&self, name: &str) -> PathBuf {
        self.build.join(name)
    }

    /// Staging tree for one package.
    pub fn stage_dir(&self, name: &str) -> PathBuf {
        self.pkg.join(name)
    }

    /// Extraction tree for one package archive.
    pub fn extract_dir(&self, name: &str) -> PathBuf {
        self.extract.join(name)
    }

    /// Path of the built tarball for a package at a version-release.
    pub fn tarball(&self, name: &str, version: &str, release: &str) -> PathBuf {
        self.bin
            .join(crate::config::tarball_name(name, version, release))
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if self.keep {
            debug!("KISS_DEBUG set, keeping scratch directories");
            return;
        }
        for dir in [&self.build, &self.pkg, &self.extract] {
            if let Err(e) = fs::remove_dir_all(dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to clean {}: {}", dir.display(), e);
                }
            }
        }
    }
}
