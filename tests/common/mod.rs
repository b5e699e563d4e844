// tests/common/mod.rs

//! Shared test fixtures for integration tests.
//!
//! Builds throwaway repositories, package definitions and target roots
//! inside a TempDir, plus downloader and strip fakes so nothing touches
//! the network or binutils.

#![allow(dead_code)]

use kiss::{Cache, Config, Downloader, StripTool};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A self-contained environment: one repository, one target root, one
/// cache. Keep the TempDir alive for the duration of the test.
pub struct TestEnv {
    pub tmp: TempDir,
    pub repo: PathBuf,
    pub config: Config,
    pub cache: Cache,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        let root = tmp.path().join("root");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(&root).unwrap();

        let config = Config::for_root(&root, vec![repo.clone()], &tmp.path().join("cache"));
        let cache = Cache::new(&config).unwrap();

        Self {
            tmp,
            repo,
            config,
            cache,
        }
    }

    /// Create a package definition whose build script installs the given
    /// `(path, content)` files into the stage.
    pub fn add_package(
        &self,
        name: &str,
        version: &str,
        depends: &str,
        files: &[(&str, &str)],
    ) -> PathBuf {
        let dir = self.repo.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("version"), format!("{version}\n")).unwrap();
        fs::write(dir.join("sources"), "").unwrap();
        if !depends.is_empty() {
            fs::write(dir.join("depends"), depends).unwrap();
        }

        let mut script = String::from("#!/bin/sh -e\n");
        for (path, content) in files {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    script.push_str(&format!("mkdir -p \"$1/{}\"\n", parent.display()));
                }
            }
            script.push_str(&format!("printf '%s' '{content}' > \"$1/{path}\"\n"));
        }
        write_executable(&dir.join("build"), &script);
        dir
    }

    /// Overwrite a package's build script with one that always fails.
    pub fn break_build(&self, name: &str) {
        write_executable(
            &self.repo.join(name).join("build"),
            "#!/bin/sh\nexit 1\n",
        );
    }

    /// Path of a file under the target root.
    pub fn rooted(&self, path: &str) -> PathBuf {
        self.config.root.join(path.trim_start_matches('/'))
    }

    /// Every file (not directory) under the target root, as sorted
    /// root-relative paths.
    pub fn root_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.config.root)
            .min_depth(1)
            .into_iter()
            .flatten()
        {
            if !entry.file_type().is_dir() {
                let rel = entry.path().strip_prefix(&self.config.root).unwrap();
                files.push(format!("/{}", rel.display()));
            }
        }
        files.sort();
        files
    }
}

pub fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// Downloader that fails every request; for tests that must stay off the
/// network.
pub struct NoNetwork;

impl Downloader for NoNetwork {
    fn download(&self, url: &str, _dest: &Path) -> Result<(), String> {
        Err(format!("network disabled in tests ({url})"))
    }
}

/// Downloader that writes fixed bytes and counts invocations.
pub struct ScriptedDownloader {
    pub body: Vec<u8>,
    pub calls: RefCell<usize>,
}

impl ScriptedDownloader {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            calls: RefCell::new(0),
        }
    }
}

impl Downloader for ScriptedDownloader {
    fn download(&self, _url: &str, dest: &Path) -> Result<(), String> {
        *self.calls.borrow_mut() += 1;
        fs::write(dest, &self.body).map_err(|e| e.to_string())
    }
}

/// Strip fake that leaves binaries alone.
pub struct NoStrip;

impl StripTool for NoStrip {
    fn strip(&self, _path: &Path, _class: kiss::ElfClass) -> io::Result<()> {
        Ok(())
    }
}
