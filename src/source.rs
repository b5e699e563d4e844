// src/source.rs

//! Source acquisition and checksum verification
//!
//! Remote sources are fetched once into the shared source cache and reused
//! on every later build; local sources resolve against the package
//! definition. The HTTP transport sits behind the [`Downloader`] trait so
//! builds are testable without a network.
//!
//! Checksums are ordered: line N of the `checksums` file covers line N of
//! `sources`. Verification is byte-exact against the stored file, trailing
//! newline included, and a mismatch is never auto-repaired.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::hash;
use crate::package::{PackageDef, Source};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KiB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Fetches a URL to a local file.
///
/// Implementations must follow redirects, fail on non-2xx responses and
/// leave no partial file behind on error.
pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> std::result::Result<(), String>;
}

/// Blocking HTTP downloader
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::IoError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> std::result::Result<(), String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let total = response.content_length().unwrap_or(0);
        let bar = if total > 0 {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template("{msg} {bytes}/{total_bytes} {wide_bar} {eta}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(
                dest.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            Some(bar)
        } else {
            None
        };

        // Stream to a temp file, rename into place on success. A failed
        // download must not leave a partial file the cache would reuse.
        let temp = dest.with_extension("part");
        let result = (|| {
            let mut file = File::create(&temp).map_err(|e| e.to_string())?;
            let mut buffer = [0u8; STREAM_BUFFER_SIZE];
            loop {
                let n = response.read(&mut buffer).map_err(|e| e.to_string())?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n]).map_err(|e| e.to_string())?;
                if let Some(bar) = &bar {
                    bar.inc(n as u64);
                }
            }
            fs::rename(&temp, dest).map_err(|e| e.to_string())
        })();

        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }
}

/// Resolve one source to a local file path, without fetching.
///
/// URLs map into the package's source-cache directory by basename; paths
/// resolve relative to the definition.
pub fn source_path(cache: &Cache, def: &PackageDef, source: &Source) -> PathBuf {
    if source.is_url() {
        cache.source_dir(&def.name).join(source.basename())
    } else {
        def.path.join(&source.src)
    }
}

/// Fetch every source of a package into the cache.
///
/// Cached files are reused as-is; checksum verification decides whether
/// they are still trustworthy. Local sources are only checked for
/// presence.
pub fn fetch(cache: &Cache, downloader: &dyn Downloader, def: &PackageDef) -> Result<()> {
    for source in def.sources()? {
        let dest = source_path(cache, def, &source);

        if source.is_url() {
            if dest.exists() {
                debug!("{}: using cached {}", def.name, source.basename());
                continue;
            }
            fs::create_dir_all(cache.source_dir(&def.name))?;
            info!("{}: downloading {}", def.name, source.src);
            downloader
                .download(&source.src, &dest)
                .map_err(|reason| Error::DownloadFailed {
                    package: def.name.clone(),
                    url: source.src.clone(),
                    reason,
                })?;
        } else if !dest.exists() {
            return Err(Error::MissingSource {
                package: def.name.clone(),
                src: source.src.clone(),
            });
        }
    }
    Ok(())
}

/// Compute the ordered checksum list for a package's sources.
///
/// Every source must already be fetched or present locally.
pub fn generate_checksums(cache: &Cache, def: &PackageDef) -> Result<Vec<String>> {
    let mut sums = Vec::new();
    for source in def.sources()? {
        let path = source_path(cache, def, &source);
        if !path.exists() {
            return Err(Error::MissingSource {
                package: def.name.clone(),
                src: source.src.clone(),
            });
        }
        sums.push(hash::hash_file(&path)?);
    }
    Ok(sums)
}

/// Verify computed checksums against the stored `checksums` file.
///
/// The comparison is byte-exact against the file contents, trailing
/// newline included.
pub fn verify_checksums(cache: &Cache, def: &PackageDef) -> Result<()> {
    let stored_path = def.path.join("checksums");
    let stored = fs::read_to_string(&stored_path)
        .map_err(|_| Error::MissingChecksums(vec![def.name.clone()]))?;

    let computed = generate_checksums(cache, def)?;
    let rendered = render_checksums(&computed);

    if rendered != stored {
        warn!("{}: checksum mismatch", def.name);
        return Err(Error::ChecksumMismatch(vec![def.name.clone()]));
    }
    Ok(())
}

/// Write a freshly generated `checksums` file into the definition.
pub fn write_checksums(def: &PackageDef, sums: &[String]) -> Result<()> {
    fs::write(def.path.join("checksums"), render_checksums(sums))?;
    Ok(())
}

fn render_checksums(sums: &[String]) -> String {
    let mut out = String::new();
    for sum in sums {
        out.push_str(sum);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::cell::RefCell;

    /// Downloader fake that records requested URLs and writes fixed bytes.
    pub struct FakeDownloader {
        pub body: Vec<u8>,
        pub requests: RefCell<Vec<String>>,
        pub fail: bool,
    }

    impl Downloader for FakeDownloader {
        fn download(&self, url: &str, dest: &Path) -> std::result::Result<(), String> {
            self.requests.borrow_mut().push(url.to_string());
            if self.fail {
                return Err("HTTP 404 Not Found".to_string());
            }
            fs::write(dest, &self.body).map_err(|e| e.to_string())
        }
    }

    fn fixture() -> (tempfile::TempDir, Cache, PackageDef) {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::for_root(tmp.path(), vec![], &tmp.path().join("cache"));
        cfg.pid = "t".to_string();
        let cache = Cache::new(&cfg).unwrap();

        let def_dir = tmp.path().join("repo/pkg");
        fs::create_dir_all(&def_dir).unwrap();
        fs::write(
            def_dir.join("sources"),
            "https://example.com/pkg-1.0.tar.gz\nlocal.patch\n",
        )
        .unwrap();
        fs::write(def_dir.join("local.patch"), b"--- a\n+++ b\n").unwrap();

        (tmp, cache, PackageDef::new("pkg", def_dir))
    }

    #[test]
    fn cached_download_is_reused() {
        let (_tmp, cache, def) = fixture();
        let dl = FakeDownloader {
            body: b"tarball".to_vec(),
            requests: RefCell::new(Vec::new()),
            fail: false,
        };

        fetch(&cache, &dl, &def).unwrap();
        assert_eq!(dl.requests.borrow().len(), 1);

        // Second fetch finds the cached file and never calls the downloader.
        fetch(&cache, &dl, &def).unwrap();
        assert_eq!(dl.requests.borrow().len(), 1);
    }

    #[test]
    fn failed_download_surfaces_url() {
        let (_tmp, cache, def) = fixture();
        let dl = FakeDownloader {
            body: Vec::new(),
            requests: RefCell::new(Vec::new()),
            fail: true,
        };
        match fetch(&cache, &dl, &def) {
            Err(Error::DownloadFailed { package, url, .. }) => {
                assert_eq!(package, "pkg");
                assert!(url.contains("example.com"));
            }
            other => panic!("expected DownloadFailed, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_local_source_fails() {
        let (_tmp, cache, def) = fixture();
        fs::remove_file(def.path.join("local.patch")).unwrap();
        let dl = FakeDownloader {
            body: b"tarball".to_vec(),
            requests: RefCell::new(Vec::new()),
            fail: false,
        };
        assert!(matches!(
            fetch(&cache, &dl, &def),
            Err(Error::MissingSource { .. })
        ));
    }

    #[test]
    fn checksums_verify_byte_exact() {
        let (_tmp, cache, def) = fixture();
        let dl = FakeDownloader {
            body: b"tarball".to_vec(),
            requests: RefCell::new(Vec::new()),
            fail: false,
        };
        fetch(&cache, &dl, &def).unwrap();

        let sums = generate_checksums(&cache, &def).unwrap();
        assert_eq!(sums.len(), 2);
        write_checksums(&def, &sums).unwrap();
        verify_checksums(&cache, &def).unwrap();

        // One flipped byte in a cached source fails verification.
        let cached = cache.source_dir("pkg").join("pkg-1.0.tar.gz");
        fs::write(&cached, b"tarbalL").unwrap();
        assert!(matches!(
            verify_checksums(&cache, &def),
            Err(Error::ChecksumMismatch(names)) if names == vec!["pkg".to_string()]
        ));
    }

    #[test]
    fn missing_checksums_file_is_reported() {
        let (_tmp, cache, def) = fixture();
        assert!(matches!(
            verify_checksums(&cache, &def),
            Err(Error::MissingChecksums(names)) if names == vec!["pkg".to_string()]
        ));
    }
}
