// src/manifest.rs

//! Package manifests
//!
//! A manifest is the authoritative list of every path a package delivers:
//! absolute, rooted at `/`, directories carrying a trailing slash, sorted
//! in reverse lexical order so directories follow their contents and the
//! list can be deleted front to back. The manifest file itself is listed
//! in the manifest.

use crate::config::PKG_DB;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use walkdir::WalkDir;

/// Generate the manifest for a staged tree.
///
/// Paths are reported relative to `stage` with a leading `/`; the stage
/// root itself is not listed.
pub fn generate(stage: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    for entry in WalkDir::new(stage).min_depth(1) {
        let entry = entry.map_err(|e| Error::IoError(format!("walking stage: {e}")))?;
        let rel = entry
            .path()
            .strip_prefix(stage)
            .map_err(|e| Error::IoError(format!("stage path escape: {e}")))?;

        let mut line = format!("/{}", rel.display());
        if entry.file_type().is_dir() {
            line.push('/');
        }
        lines.push(line);
    }

    lines.sort_by(|a, b| b.cmp(a));
    Ok(lines)
}

/// Write the manifest for a staged package into its installed-db entry.
///
/// The manifest file is created before the stage walk so it lists itself.
pub fn write_for_stage(stage: &Path, name: &str) -> Result<Vec<String>> {
    let manifest_path = stage.join(PKG_DB).join(name).join("manifest");
    if let Some(parent) = manifest_path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(&manifest_path)?;

    let lines = generate(stage)?;
    fs::write(&manifest_path, render(&lines))?;
    Ok(lines)
}

/// Read a manifest file into its ordered line list.
pub fn read(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("{}: {}", path.display(), e)))?;
    Ok(content.lines().map(String::from).collect())
}

/// Paths present in `old` but absent from `new`, in `old`'s order.
///
/// Both inputs are reverse-sorted manifests, so the result is already in
/// safe deletion order (files before their directories).
pub fn difference(old: &[String], new: &[String]) -> Vec<String> {
    let keep: HashSet<&str> = new.iter().map(String::as_str).collect();
    old.iter()
        .filter(|line| !keep.contains(line.as_str()))
        .cloned()
        .collect()
}

fn render(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_with(paths: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for path in paths {
            let full = tmp.path().join(path.trim_start_matches('/'));
            if path.ends_with('/') {
                fs::create_dir_all(full).unwrap();
            } else {
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, b"x").unwrap();
            }
        }
        tmp
    }

    #[test]
    fn directories_follow_their_contents() {
        let stage = stage_with(&["usr/bin/foo", "usr/share/misc/", "usr/bin/bar"]);
        let lines = generate(stage.path()).unwrap();
        assert_eq!(
            lines,
            vec![
                "/usr/share/misc/",
                "/usr/share/",
                "/usr/bin/foo",
                "/usr/bin/bar",
                "/usr/bin/",
                "/usr/",
            ]
        );
    }

    #[test]
    fn manifest_lists_itself() {
        let stage = stage_with(&["usr/bin/foo"]);
        let lines = write_for_stage(stage.path(), "foo").unwrap();
        let manifest_line = format!("/{PKG_DB}/foo/manifest");
        assert!(lines.contains(&manifest_line));

        // The on-disk file round-trips to the same list.
        let on_disk = read(&stage.path().join(PKG_DB).join("foo/manifest")).unwrap();
        assert_eq!(on_disk, lines);
    }

    #[test]
    fn difference_preserves_deletion_order() {
        let old = vec![
            "/usr/share/x/old".to_string(),
            "/usr/share/x/".to_string(),
            "/usr/bin/x".to_string(),
        ];
        let new = vec!["/usr/share/x/".to_string(), "/usr/bin/x".to_string()];
        assert_eq!(difference(&old, &new), vec!["/usr/share/x/old"]);
    }
}
