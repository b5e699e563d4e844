// src/build/strip.rs

//! Binary stripping
//!
//! Every regular file in the stage is classified by its ELF header and
//! handed to the strip tool: shared objects lose unneeded symbols,
//! executables are fully stripped, relocatable objects keep their symbol
//! table and lose only debug sections. Non-ELF files are skipped and a
//! failure on one file never fails the build.
//!
//! The tool itself sits behind a trait so the pipeline is testable on
//! hosts without binutils.

use crate::error::Result;
use goblin::elf::header::{ET_DYN, ET_EXEC, ET_REL};
use goblin::elf::Elf;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// ELF object classification from `e_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    /// `ET_DYN`: shared object (or PIE executable)
    SharedObject,
    /// `ET_EXEC`: position-dependent executable
    Executable,
    /// `ET_REL`: relocatable object
    Relocatable,
}

/// Strips one classified binary in place.
pub trait StripTool {
    fn strip(&self, path: &Path, class: ElfClass) -> io::Result<()>;
}

/// The system `strip` binary from binutils.
pub struct SystemStrip;

impl StripTool for SystemStrip {
    fn strip(&self, path: &Path, class: ElfClass) -> io::Result<()> {
        let mut cmd = Command::new("strip");
        match class {
            ElfClass::SharedObject => {
                cmd.arg("--strip-unneeded");
            }
            ElfClass::Executable => {}
            ElfClass::Relocatable => {
                cmd.arg("--strip-debug");
            }
        }
        let status = cmd.arg(path).status()?;
        if !status.success() {
            return Err(io::Error::other(format!("strip exited with {status}")));
        }
        Ok(())
    }
}

/// Classify a file by its ELF header, or `None` for anything that is not
/// an ELF object.
pub fn classify(path: &Path) -> Option<ElfClass> {
    let mut header = [0u8; 64];
    let mut file = File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    let header = Elf::parse_header(&header[..n]).ok()?;

    match header.e_type {
        ET_DYN => Some(ElfClass::SharedObject),
        ET_EXEC => Some(ElfClass::Executable),
        ET_REL => Some(ElfClass::Relocatable),
        _ => None,
    }
}

/// Strip every ELF file under the stage. Individual failures are logged
/// and tolerated.
pub fn strip_stage(stage: &Path, tool: &dyn StripTool) -> Result<()> {
    for entry in WalkDir::new(stage).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(class) = classify(entry.path()) else {
            continue;
        };
        debug!("stripping {} ({:?})", entry.path().display(), class);
        if let Err(e) = tool.strip(entry.path(), class) {
            warn!("failed to strip {}: {}", entry.path().display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;

    /// Strip fake that records what it was asked to strip.
    pub struct RecordingStrip {
        pub stripped: RefCell<Vec<(PathBuf, ElfClass)>>,
    }

    impl RecordingStrip {
        pub fn new() -> Self {
            Self {
                stripped: RefCell::new(Vec::new()),
            }
        }
    }

    impl StripTool for RecordingStrip {
        fn strip(&self, path: &Path, class: ElfClass) -> io::Result<()> {
            self.stripped.borrow_mut().push((path.to_path_buf(), class));
            Ok(())
        }
    }

    /// Minimal 64-bit little-endian ELF header with the given e_type.
    pub fn fake_elf(e_type: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        bytes[4] = 2; // ELFCLASS64
        bytes[5] = 1; // little endian
        bytes[6] = 1; // EV_CURRENT
        bytes[16..18].copy_from_slice(&e_type.to_le_bytes());
        bytes[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        bytes[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
        bytes[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        bytes
    }

    #[test]
    fn classifies_by_elf_type() {
        let tmp = tempfile::tempdir().unwrap();

        let so = tmp.path().join("lib.so");
        fs::write(&so, fake_elf(ET_DYN)).unwrap();
        assert_eq!(classify(&so), Some(ElfClass::SharedObject));

        let exe = tmp.path().join("bin");
        fs::write(&exe, fake_elf(ET_EXEC)).unwrap();
        assert_eq!(classify(&exe), Some(ElfClass::Executable));

        let obj = tmp.path().join("crt.o");
        fs::write(&obj, fake_elf(ET_REL)).unwrap();
        assert_eq!(classify(&obj), Some(ElfClass::Relocatable));

        let text = tmp.path().join("README");
        fs::write(&text, b"not an elf").unwrap();
        assert_eq!(classify(&text), None);
    }

    #[test]
    fn stage_walk_skips_non_elf() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("usr/bin")).unwrap();
        fs::create_dir_all(tmp.path().join("usr/lib")).unwrap();
        fs::write(tmp.path().join("usr/bin/tool"), fake_elf(ET_EXEC)).unwrap();
        fs::write(tmp.path().join("usr/lib/lib.so"), fake_elf(ET_DYN)).unwrap();
        fs::write(tmp.path().join("usr/bin/script"), b"#!/bin/sh\n").unwrap();

        let tool = RecordingStrip::new();
        strip_stage(tmp.path(), &tool).unwrap();

        let stripped = tool.stripped.borrow();
        assert_eq!(stripped.len(), 2);
        assert!(stripped
            .iter()
            .any(|(p, c)| p.ends_with("usr/bin/tool") && *c == ElfClass::Executable));
        assert!(stripped
            .iter()
            .any(|(p, c)| p.ends_with("usr/lib/lib.so") && *c == ElfClass::SharedObject));
    }
}
