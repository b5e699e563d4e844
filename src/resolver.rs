// src/resolver.rs

//! Dependency resolution
//!
//! Depth-first traversal over the `depends` graph producing an ordered,
//! duplicate-free list in which every prerequisite precedes its dependents.
//! The list is pure insertion order; nothing is re-sorted afterwards, so
//! the same inputs always yield the same plan.
//!
//! In build mode, nodes that are already installed and were not named by
//! the user are pruned, and the user-named roots themselves are withheld
//! from the list: the driver appends them after all dependency work so the
//! explicit/implicit partition stays visible. A root that turns out to be
//! a transitive dependency of another root is demoted from the explicit
//! set, since it will be handled as a dependency anyway.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::PackageDef;
use crate::repository;
use std::collections::HashSet;

/// What the resolved list will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Prune installed non-roots; withhold roots from the list
    Build,
    /// Full closure, roots in place
    Install,
    /// Full closure over installed packages, roots in place
    Remove,
}

/// Result of a resolution pass.
#[derive(Debug)]
pub struct Resolution {
    /// Dependency-ordered package list (deepest prerequisites first)
    pub order: Vec<String>,
    /// User-named roots that did not appear as transitive dependencies,
    /// in the order the user gave them
    pub explicit: Vec<String>,
}

impl Resolution {
    /// Full work order for the build driver: dependencies, then the
    /// explicit roots.
    pub fn build_order(&self) -> Vec<String> {
        self.order
            .iter()
            .chain(self.explicit.iter())
            .cloned()
            .collect()
    }

    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.iter().any(|n| n == name)
    }
}

struct Traversal<'a> {
    config: &'a Config,
    mode: ResolveMode,
    order: Vec<String>,
    listed: HashSet<String>,
    visiting: HashSet<String>,
}

/// Resolve the dependency closure of `roots`.
pub fn resolve(config: &Config, roots: &[String], mode: ResolveMode) -> Result<Resolution> {
    let mut traversal = Traversal {
        config,
        mode,
        order: Vec::new(),
        listed: HashSet::new(),
        visiting: HashSet::new(),
    };

    let root_set: HashSet<&str> = roots.iter().map(String::as_str).collect();
    for root in roots {
        traversal.visit(root, &root_set, true)?;
    }

    // Roots pulled in as someone else's dependency are demoted.
    let mut explicit = Vec::new();
    for root in roots {
        if !traversal.listed.contains(root) && !explicit.contains(root) {
            explicit.push(root.clone());
        }
    }

    Ok(Resolution {
        order: traversal.order,
        explicit,
    })
}

impl Traversal<'_> {
    /// `as_root` is true only for the top-level calls: a user-named
    /// package reached through another root's dependency chain takes the
    /// dependency path (and ends up demoted from the explicit set).
    fn visit(&mut self, name: &str, roots: &HashSet<&str>, as_root: bool) -> Result<()> {
        // Dedup: already planned.
        if self.listed.contains(name) {
            return Ok(());
        }
        // Cycle tolerance: a node currently on the stack is not revisited.
        if self.visiting.contains(name) {
            return Ok(());
        }

        // Build-mode prune: installed packages the user did not name need
        // no work.
        if self.mode == ResolveMode::Build
            && !roots.contains(name)
            && self.config.is_installed(name)
        {
            return Ok(());
        }

        let def = match repository::find(self.config, name) {
            Ok(path) => Some(PackageDef::new(name, path)),
            // Outside build mode a vanished definition is a leaf; the
            // operation itself decides whether that matters.
            Err(Error::NotFound(_)) if self.mode != ResolveMode::Build => None,
            Err(e) => return Err(e),
        };

        self.visiting.insert(name.to_string());
        if let Some(def) = &def {
            if !(self.mode == ResolveMode::Build && def.has_marker("nodepends")) {
                for dep in def.depends() {
                    self.visit(&dep.name, roots, false)?;
                }
            }
        }
        self.visiting.remove(name);

        // Top-level roots are withheld in build mode; the driver appends
        // them after all dependency work.
        if !(self.mode == ResolveMode::Build && as_root) {
            self.order.push(name.to_string());
            self.listed.insert(name.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn repo_with(packages: &[(&str, &str)]) -> (tempfile::TempDir, Config) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        for (name, depends) in packages {
            let dir = repo.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("version"), "1.0 1\n").unwrap();
            if !depends.is_empty() {
                fs::write(dir.join("depends"), depends).unwrap();
            }
        }
        let cfg = Config::for_root(tmp.path(), vec![repo], Path::new("/tmp/unused"));
        (tmp, cfg)
    }

    #[test]
    fn linear_chain_orders_deepest_first() {
        let (_tmp, cfg) = repo_with(&[("a", "b\n"), ("b", "c\n"), ("c", "")]);
        let res = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
        assert_eq!(res.order, vec!["c", "b"]);
        assert_eq!(res.explicit, vec!["a"]);
        assert_eq!(res.build_order(), vec!["c", "b", "a"]);
    }

    #[test]
    fn diamond_never_duplicates() {
        let (_tmp, cfg) = repo_with(&[("a", "b\nc\n"), ("b", "d\n"), ("c", "d\n"), ("d", "")]);
        let res = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
        assert_eq!(res.order, vec!["d", "b", "c"]);
        assert_eq!(res.build_order(), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn cycles_terminate() {
        let (_tmp, cfg) = repo_with(&[("a", "b\n"), ("b", "a\n")]);
        let res = resolve(&cfg, &["a".into()], ResolveMode::Install).unwrap();
        assert_eq!(res.order, vec!["b", "a"]);
    }

    #[test]
    fn installed_dependencies_are_pruned_in_build_mode() {
        let (_tmp, cfg) = repo_with(&[("a", "b\n"), ("b", "")]);
        fs::create_dir_all(cfg.installed_entry("b")).unwrap();
        fs::write(cfg.installed_entry("b").join("version"), "1.0 1\n").unwrap();

        let res = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
        assert!(res.order.is_empty());
        assert_eq!(res.explicit, vec!["a"]);

        // A user-named root is rebuilt even when installed.
        let res = resolve(&cfg, &["b".into()], ResolveMode::Build).unwrap();
        assert_eq!(res.explicit, vec!["b"]);
    }

    #[test]
    fn root_that_is_also_a_dependency_is_demoted() {
        let (_tmp, cfg) = repo_with(&[("a", "b\n"), ("b", "")]);
        let res = resolve(&cfg, &["a".into(), "b".into()], ResolveMode::Build).unwrap();
        assert_eq!(res.order, vec!["b"]);
        assert_eq!(res.explicit, vec!["a"]);
        assert!(!res.is_explicit("b"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let (_tmp, cfg) = repo_with(&[("a", "b\nc\n"), ("b", "d\n"), ("c", "d\n"), ("d", "")]);
        let first = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
        for _ in 0..5 {
            let again = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
            assert_eq!(first.order, again.order);
            assert_eq!(first.explicit, again.explicit);
        }
    }

    #[test]
    fn nodepends_marker_short_circuits() {
        let (tmp, cfg) = repo_with(&[("a", "b\n"), ("b", "")]);
        fs::write(tmp.path().join("repo/a/nodepends"), "").unwrap();
        let res = resolve(&cfg, &["a".into()], ResolveMode::Build).unwrap();
        assert!(res.order.is_empty());
    }

    #[test]
    fn missing_dependency_fails_build_resolution() {
        let (_tmp, cfg) = repo_with(&[("a", "ghost\n")]);
        assert!(matches!(
            resolve(&cfg, &["a".into()], ResolveMode::Build),
            Err(Error::NotFound(_))
        ));
    }
}
