// src/error.rs

//! Error types for the package manager
//!
//! Every user-visible failure maps to one variant here. Failures that the
//! drivers batch (missing checksum files, checksum mismatches, missing
//! dependencies) carry the full list of offenders so the user sees one
//! complete report instead of aborting at the first package.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Package manager errors
#[derive(Error, Debug)]
pub enum Error {
    /// No repository search path configured
    #[error("no repository search path configured (set KISS_PATH)")]
    NoSearchPath,

    /// Package definition not found in any repository
    #[error("'{0}' not found in any repository")]
    NotFound(String),

    /// Package is not present in the installed database
    #[error("'{0}' is not installed")]
    NotInstalled(String),

    /// Package name contains forbidden characters or is empty
    #[error("invalid package name '{0}'")]
    InvalidName(String),

    /// Archive does not contain an installed-db entry
    #[error("'{0}' is not a valid package archive")]
    InvalidPackage(String),

    /// Package definition failed a lint check
    #[error("{package}: {reason}")]
    InvalidMetadata { package: String, reason: String },

    /// One or more packages have no checksums file
    #[error("missing checksums for: {}", .0.join(", "))]
    MissingChecksums(Vec<String>),

    /// Computed checksums differ from the stored checksums file
    #[error("checksum mismatch for: {}", .0.join(", "))]
    ChecksumMismatch(Vec<String>),

    /// Remote source could not be fetched
    #[error("{package}: failed to download {url}: {reason}")]
    DownloadFailed {
        package: String,
        url: String,
        reason: String,
    },

    /// Local source file is missing from the package definition
    #[error("{package}: no local source '{src}'")]
    MissingSource { package: String, src: String },

    /// Source archive could not be extracted
    #[error("{package}: failed to extract {archive}: {reason}")]
    ExtractFailed {
        package: String,
        archive: String,
        reason: String,
    },

    /// Build script exited non-zero
    #[error("{0}: build failed")]
    BuildFailed(String),

    /// Manifest overlaps with an already installed package
    #[error("{package}: file conflicts with installed packages:\n{}", .paths.join("\n"))]
    Conflict { package: String, paths: Vec<String> },

    /// No pre-built tarball in the binary cache
    #[error("'{0}' has not been built (run 'kiss build {0}' first)")]
    NotBuilt(String),

    /// Runtime dependencies missing from the installed database
    #[error("{package}: missing dependencies: {}", .deps.join(", "))]
    MissingDeps { package: String, deps: Vec<String> },

    /// Removal blocked by installed packages that depend on the target
    #[error("{package}: required by: {}", .dependents.join(", "))]
    RequiredBy {
        package: String,
        dependents: Vec<String>,
    },

    /// Operation cancelled by the user between package operations
    #[error("interrupted")]
    Interrupted,

    /// I/O failure with context
    #[error("{0}")]
    IoError(String),

    /// I/O failure without additional context
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
