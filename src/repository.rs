// src/repository.rs

//! Repository lookup across the search path
//!
//! A repository is a directory whose immediate children are package
//! definitions. The search path is an ordered list of repository roots; the
//! installed database acts as one final, implicit root so installed packages
//! resolve even when their repository has been removed. First match wins.

use crate::config::Config;
use crate::error::{Error, Result};
use glob::Pattern;
use std::path::PathBuf;

/// Characters that may never appear in a package name.
const FORBIDDEN: &[char] = &['*', '!', '[', ']'];

/// Validate a package name.
///
/// Names are used as directory names and identity keys, so shell-glob
/// metacharacters and empty strings are rejected up front.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(FORBIDDEN) || name.contains('/') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Find the first package definition matching `name`.
///
/// Scans each repository root in declared order, then the installed
/// database.
pub fn find(config: &Config, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    roots(config, true)
        .into_iter()
        .map(|root| root.join(name))
        .find(|p| p.is_dir())
        .ok_or_else(|| {
            if config.search_path.is_empty() {
                Error::NoSearchPath
            } else {
                Error::NotFound(name.to_string())
            }
        })
}

/// Find a package definition in the repositories only, skipping the
/// installed database. Used by update to compare against upstream.
pub fn find_in_repos(config: &Config, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    if config.search_path.is_empty() {
        return Err(Error::NoSearchPath);
    }
    roots(config, false)
        .into_iter()
        .map(|root| root.join(name))
        .find(|p| p.is_dir())
        .ok_or_else(|| Error::NotFound(name.to_string()))
}

/// Find every definition whose name matches a shell-style pattern.
///
/// Matches are reported per root in search-path order; within one root the
/// OS enumeration order is kept.
pub fn search(config: &Config, pattern: &str) -> Result<Vec<PathBuf>> {
    let pat = Pattern::new(pattern).map_err(|_| Error::InvalidName(pattern.to_string()))?;
    let mut hits = Vec::new();

    for root in roots(config, true) {
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if entry.path().is_dir() && pat.matches(&name) {
                hits.push(entry.path());
            }
        }
    }

    if hits.is_empty() {
        if config.search_path.is_empty() {
            return Err(Error::NoSearchPath);
        }
        return Err(Error::NotFound(pattern.to_string()));
    }
    Ok(hits)
}

/// The ordered list of roots to scan: the search path, then optionally the
/// installed database.
fn roots(config: &Config, include_db: bool) -> Vec<PathBuf> {
    let mut roots = config.search_path.clone();
    if include_db {
        roots.push(config.installed_db());
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn config_with_repos(repos: &[&Path], root: &Path) -> Config {
        Config::for_root(
            root,
            repos.iter().map(|p| p.to_path_buf()).collect(),
            Path::new("/tmp/unused-cache"),
        )
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_name("zlib").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("z*b").is_err());
        assert!(validate_name("z!b").is_err());
        assert!(validate_name("a[b]").is_err());
        assert!(validate_name("../etc").is_err());
    }

    #[test]
    fn first_repository_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_a = tmp.path().join("a");
        let repo_b = tmp.path().join("b");
        fs::create_dir_all(repo_a.join("zlib")).unwrap();
        fs::create_dir_all(repo_b.join("zlib")).unwrap();

        let cfg = config_with_repos(&[&repo_a, &repo_b], tmp.path());
        assert_eq!(find(&cfg, "zlib").unwrap(), repo_a.join("zlib"));
    }

    #[test]
    fn installed_db_is_scanned_last() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();

        let cfg = config_with_repos(&[&repo], tmp.path());
        fs::create_dir_all(cfg.installed_entry("orphan")).unwrap();

        // Not in the repo, but resolvable from the installed db.
        assert_eq!(find(&cfg, "orphan").unwrap(), cfg.installed_entry("orphan"));
        assert!(matches!(
            find_in_repos(&cfg, "orphan"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn missing_package_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let cfg = config_with_repos(&[&repo], tmp.path());
        assert!(matches!(find(&cfg, "nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn search_supports_wildcards() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(repo.join("zlib")).unwrap();
        fs::create_dir_all(repo.join("zstd")).unwrap();
        fs::create_dir_all(repo.join("curl")).unwrap();

        let cfg = config_with_repos(&[&repo], tmp.path());
        let hits = search(&cfg, "z*").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(search(&cfg, "nomatch*").is_err());
    }
}
