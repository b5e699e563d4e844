// src/build/extract.rs

//! Source extraction into the build tree
//!
//! Tar archives are unpacked with their leading path component stripped so
//! `pkg-1.0/configure` lands at `configure`. Anything that is not a tar
//! archive is copied into the destination verbatim. Compression is
//! detected from the filename with a magic-byte fallback for servers that
//! hand out extensionless downloads.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::package::PackageDef;
use crate::source;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Compression wrapping a tar archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Xz,
}

impl Compression {
    /// Gzip: `1f 8b`; XZ: `fd 37 7a 58 5a 00`.
    fn detect(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            return Ok(Self::Gzip);
        }
        if name.ends_with(".xz") {
            return Ok(Self::Xz);
        }

        let mut magic = [0u8; 6];
        let mut file = File::open(path)?;
        let n = file.read(&mut magic)?;
        if n >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
            Ok(Self::Gzip)
        } else if n >= 6 && magic == [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00] {
            Ok(Self::Xz)
        } else {
            Ok(Self::None)
        }
    }
}

/// Whether a source filename names a tar archive that should be unpacked
/// rather than copied: `*.tar`, `*.tar.??` through `*.tar.????`, `*.tgz`.
pub fn is_tar_source(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    if base.ends_with(".tar") || base.ends_with(".tgz") {
        return true;
    }
    if let Some(idx) = base.rfind(".tar.") {
        let ext = &base[idx + ".tar.".len()..];
        return (2..=4).contains(&ext.len()) && !ext.contains('.');
    }
    false
}

/// Unpack a tar archive into `dest` with its first path component
/// stripped.
pub fn extract_tar(package: &str, archive: &Path, dest: &Path) -> Result<()> {
    let fail = |reason: String| Error::ExtractFailed {
        package: package.to_string(),
        archive: archive.display().to_string(),
        reason,
    };

    let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
    let reader: Box<dyn Read> = match Compression::detect(archive)? {
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::None => Box::new(file),
    };

    let mut tar = Archive::new(reader);
    tar.set_preserve_permissions(true);

    for entry in tar.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let path = entry.path().map_err(|e| fail(e.to_string()))?;

        // Drop the leading `pkg-1.0/` component.
        let stripped: std::path::PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(stripped);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target).map_err(|e| fail(e.to_string()))?;
    }
    Ok(())
}

/// Populate the package's build tree from its sources.
pub fn extract_sources(cache: &Cache, def: &PackageDef) -> Result<()> {
    let build_root = cache.build_dir(&def.name);

    for src in def.sources()? {
        let dest = if src.dest.is_empty() {
            build_root.clone()
        } else {
            build_root.join(&src.dest)
        };
        fs::create_dir_all(&dest)?;

        let path = source::source_path(cache, def, &src);
        if src.is_url() && is_tar_source(&src.src) {
            debug!("{}: extracting {}", def.name, src.basename());
            extract_tar(&def.name, &path, &dest)?;
        } else if path.is_dir() {
            copy_tree(&path, &dest.join(src.basename()))?;
        } else {
            fs::copy(&path, dest.join(src.basename()))?;
        }
    }
    Ok(())
}

/// Recursively copy a directory tree, preserving permissions and symlinks.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tar_source_patterns() {
        assert!(is_tar_source("zlib-1.3.tar"));
        assert!(is_tar_source("zlib-1.3.tar.gz"));
        assert!(is_tar_source("zlib-1.3.tar.bz2"));
        assert!(is_tar_source("zlib-1.3.tar.zst"));
        assert!(is_tar_source("https://example.com/zlib-1.3.tgz"));
        assert!(!is_tar_source("zlib-1.3.zip"));
        assert!(!is_tar_source("fix.patch"));
        assert!(!is_tar_source("archive.tar.a.b"));
        assert!(!is_tar_source("archive.tar.toolong"));
    }

    #[test]
    fn extraction_strips_leading_component() {
        let tmp = tempfile::tempdir().unwrap();

        // Build a small gzipped tarball: pkg-1.0/{README,src/main.c}.
        let tarball = tmp.path().join("pkg-1.0.tar.gz");
        let gz = flate2::write::GzEncoder::new(
            File::create(&tarball).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        let tree = tmp.path().join("tree/pkg-1.0");
        fs::create_dir_all(tree.join("src")).unwrap();
        fs::write(tree.join("README"), b"readme").unwrap();
        fs::write(tree.join("src/main.c"), b"int main(){}").unwrap();
        builder
            .append_dir_all("pkg-1.0", tmp.path().join("tree/pkg-1.0"))
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("build");
        extract_tar("pkg", &tarball, &dest).unwrap();
        assert!(dest.join("README").is_file());
        assert!(dest.join("src/main.c").is_file());
        assert!(!dest.join("pkg-1.0").exists());
    }

    #[test]
    fn copy_tree_preserves_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/file"), b"data").unwrap();
        std::os::unix::fs::symlink("sub/file", src.join("link")).unwrap();

        let dst = tmp.path().join("dst");
        copy_tree(&src, &dst).unwrap();
        assert_eq!(fs::read(dst.join("sub/file")).unwrap(), b"data");
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap(),
            Path::new("sub/file")
        );
    }
}
