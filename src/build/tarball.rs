// src/build/tarball.rs

//! Staged package archiving
//!
//! A finished stage becomes `<bin>/<name>#<version>-<release>.tar.gz`:
//! gzip-compressed tar whose entries are rooted at `./`, symlinks stored
//! as symlinks, permissions and ownership taken from the stage.
//!
//! Multiply-linked files are stored once; later occurrences become
//! hard-link entries keyed on `(dev, ino)`, so link groups survive the
//! round trip to the target root instead of inflating into independent
//! copies.

use crate::error::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

/// Archive a stage into a gzip tarball at `dest`.
pub fn create(stage: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .map_err(|e| Error::IoError(format!("creating {}: {}", dest.display(), e)))?;
    let gz = GzEncoder::new(file, Compression::default());

    let mut builder = Builder::new(gz);
    builder.follow_symlinks(false);

    // In-archive path of the first copy of each multiply-linked inode.
    let mut linked: HashMap<(u64, u64), PathBuf> = HashMap::new();

    for entry in WalkDir::new(stage).min_depth(1) {
        let entry = entry.map_err(|e| Error::IoError(format!("walking stage: {e}")))?;
        let rel = entry
            .path()
            .strip_prefix(stage)
            .map_err(|e| Error::IoError(format!("stage path escape: {e}")))?;
        let name = Path::new(".").join(rel);
        let fail = |e: std::io::Error| {
            Error::IoError(format!("archiving {}: {}", entry.path().display(), e))
        };

        if entry.file_type().is_file() {
            let meta = entry.metadata().map_err(|e| {
                Error::IoError(format!("{}: {}", entry.path().display(), e))
            })?;
            if meta.nlink() > 1 {
                let key = (meta.dev(), meta.ino());
                if let Some(first) = linked.get(&key) {
                    debug!("{} is a hard link to {}", name.display(), first.display());
                    let mut header = Header::new_gnu();
                    header.set_metadata(&meta);
                    header.set_entry_type(EntryType::Link);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, &name, first)
                        .map_err(fail)?;
                    continue;
                }
                linked.insert(key, name.clone());
            }
        }

        builder
            .append_path_with_name(entry.path(), &name)
            .map_err(fail)?;
    }

    let gz = builder
        .into_inner()
        .map_err(|e| Error::IoError(format!("finishing archive: {e}")))?;
    gz.finish()
        .map_err(|e| Error::IoError(format!("finishing archive: {e}")))?;

    debug!("wrote {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;

    #[test]
    fn tarball_round_trips_the_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        fs::create_dir_all(stage.join("usr/bin")).unwrap();
        fs::write(stage.join("usr/bin/hello"), b"#!/bin/sh\necho hi\n").unwrap();
        std::os::unix::fs::symlink("hello", stage.join("usr/bin/hi")).unwrap();

        let dest = tmp.path().join("pkg#1.0-1.tar.gz");
        create(&stage, &dest).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let out = tmp.path().join("out");
        archive.unpack(&out).unwrap();
        assert_eq!(
            fs::read(out.join("usr/bin/hello")).unwrap(),
            b"#!/bin/sh\necho hi\n"
        );
        assert!(out.join("usr/bin/hi").symlink_metadata().unwrap().is_symlink());
    }

    #[test]
    fn hard_link_groups_survive_the_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        fs::create_dir_all(stage.join("usr/bin")).unwrap();
        fs::write(stage.join("usr/bin/a"), b"tool").unwrap();
        fs::hard_link(stage.join("usr/bin/a"), stage.join("usr/bin/b")).unwrap();

        let dest = tmp.path().join("pkg#1.0-1.tar.gz");
        create(&stage, &dest).unwrap();

        // The second occurrence is stored as a link entry, not a copy.
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let links = archive
            .entries()
            .unwrap()
            .filter(|e| {
                e.as_ref().unwrap().header().entry_type() == EntryType::Link
            })
            .count();
        assert_eq!(links, 1);

        // Extraction reconstitutes the link group.
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let out = tmp.path().join("out");
        archive.unpack(&out).unwrap();
        let a = fs::metadata(out.join("usr/bin/a")).unwrap();
        let b = fs::metadata(out.join("usr/bin/b")).unwrap();
        assert_eq!(a.ino(), b.ino());
        assert_eq!(a.nlink(), 2);
    }
}
