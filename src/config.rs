// src/config.rs

//! Environment-derived configuration
//!
//! The manager is configured entirely through environment variables, read
//! once at startup into a [`Config`] that is passed by reference into every
//! operation. There is no config file and no module-level mutable state.
//!
//! | Variable         | Meaning                                           |
//! |------------------|---------------------------------------------------|
//! | `KISS_PATH`      | Colon-separated repository roots                  |
//! | `KISS_ROOT`      | Target root filesystem (default `/`)              |
//! | `KISS_FORCE`     | `1` bypasses dependency gates on install/remove   |
//! | `KISS_DEBUG`     | `1` preserves per-invocation scratch directories  |
//! | `KISS_PID`       | Overrides the scratch-directory key               |
//! | `KISS_JUNK`      | Colon-separated stage paths pruned after build    |
//! | `KISS_BUILDLOG`  | Build output sink; unset inherits the terminal    |
//! | `XDG_CACHE_HOME` | Cache base (falls back to `$HOME/.cache`)         |

use std::env;
use std::path::{Path, PathBuf};

/// Installed-package database, relative to the target root.
pub const PKG_DB: &str = "var/db/kiss/installed";

/// Stage paths removed by the junk-prune stage unless `KISS_JUNK` overrides
/// them. The charset.alias entry is a single file that every gettext-using
/// package would otherwise deliver and conflict on.
pub const DEFAULT_JUNK: &[&str] = &[
    "usr/share/doc",
    "usr/share/gtk-doc",
    "usr/share/info",
    "usr/share/gettext",
    "usr/share/locale",
    "usr/share/polkit-1",
    "usr/share/bash-completion",
    "usr/share/zsh",
    "usr/share/fish",
    "etc/bash_completion.d",
    "usr/lib/charset.alias",
];

/// Immutable per-invocation configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered repository roots from `KISS_PATH`
    pub search_path: Vec<PathBuf>,
    /// Target root filesystem receiving installs
    pub root: PathBuf,
    /// Bypass dependency gates on install/remove
    pub force: bool,
    /// Keep scratch directories after exit
    pub debug: bool,
    /// Scratch-directory key, normally the process id
    pub pid: String,
    /// Stage paths deleted by the junk-prune stage
    pub junk: Vec<String>,
    /// Build output sink; `None` inherits the caller's stdio
    pub build_log: Option<PathBuf>,
    /// Cache base directory (`<cache_base>/kiss`)
    pub cache_root: PathBuf,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let search_path = env::var("KISS_PATH")
            .unwrap_or_default()
            .split(':')
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();

        let root = PathBuf::from(env::var("KISS_ROOT").unwrap_or_else(|_| "/".to_string()));

        let junk = match env::var("KISS_JUNK") {
            Ok(list) => list
                .split(':')
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => DEFAULT_JUNK.iter().map(|s| s.to_string()).collect(),
        };

        let cache_base = env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                PathBuf::from(env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
                    .join(".cache")
            });

        Self {
            search_path,
            root,
            force: flag_set("KISS_FORCE"),
            debug: flag_set("KISS_DEBUG"),
            pid: env::var("KISS_PID").unwrap_or_else(|_| std::process::id().to_string()),
            junk,
            build_log: env::var("KISS_BUILDLOG").ok().map(PathBuf::from),
            cache_root: cache_base.join("kiss"),
        }
    }

    /// Installed-package database under the target root.
    pub fn installed_db(&self) -> PathBuf {
        self.root.join(PKG_DB)
    }

    /// Installed-db entry directory for one package.
    pub fn installed_entry(&self, name: &str) -> PathBuf {
        self.installed_db().join(name)
    }

    /// Whether a package has an installed-db entry.
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed_entry(name).is_dir()
    }
}

fn flag_set(var: &str) -> bool {
    matches!(env::var(var).as_deref(), Ok("1") | Ok("true") | Ok("yes"))
}

/// Tarball filename for a package at a given version-release.
pub fn tarball_name(name: &str, version: &str, release: &str) -> String {
    format!("{name}#{version}-{release}.tar.gz")
}

/// Test-friendly constructor used throughout the test suite.
impl Config {
    pub fn for_root(root: &Path, search_path: Vec<PathBuf>, cache_root: &Path) -> Self {
        Self {
            search_path,
            root: root.to_path_buf(),
            force: false,
            debug: false,
            pid: std::process::id().to_string(),
            junk: DEFAULT_JUNK.iter().map(|s| s.to_string()).collect(),
            build_log: None,
            cache_root: cache_root.to_path_buf(),
        }
    }
}
