// src/lib.rs

//! kiss - source-based package manager
//!
//! Packages are directories of small text files in repositories on disk;
//! building runs each package's `build` script against an isolated stage,
//! archives the result, and installing mirrors the archive into the
//! target root under a manifest that makes removal exact.
//!
//! # Architecture
//!
//! - Repository tree -> metadata -> resolver -> source cache -> build
//!   pipeline -> staged tarball -> install -> installed db + target root
//! - All state is threaded through [`config::Config`] and
//!   [`cache::Cache`]; no module-level mutable state
//! - Subprocess seams (downloader, strip) are traits for testability

pub mod build;
pub mod cache;
pub mod config;
mod error;
pub mod hash;
pub mod install;
pub mod interrupt;
pub mod manifest;
pub mod package;
pub mod remove;
pub mod repository;
pub mod resolver;
pub mod source;
pub mod update;

pub use build::{BuildContext, ElfClass, StripTool, SystemStrip};
pub use cache::Cache;
pub use config::Config;
pub use error::{Error, Result};
pub use package::{DepKind, Dependency, PackageDef, Source, Version};
pub use resolver::{Resolution, ResolveMode};
pub use source::{Downloader, HttpDownloader};
