//! Suffix-based selection of compress/decompress mode and archive format.

use std::fmt;
use std::path::Path;

use crate::error::{ArchiverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Bz2,
    Zstd,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 2] = [ArchiveFormat::Bz2, ArchiveFormat::Zstd];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Bz2 => "bz2",
            ArchiveFormat::Zstd => "zst",
        }
    }

    /// Format whose `.ext` suffix ends the file name of `path`, ignoring
    /// ASCII case. A bare `.zst` counts too.
    pub fn from_path(path: &Path) -> Option<ArchiveFormat> {
        let name = path.file_name()?.as_encoded_bytes();
        Self::ALL.into_iter().find(|format| {
            let ext = format.extension().as_bytes();
            let suffix_len = ext.len() + 1;
            name.len() >= suffix_len && {
                let suffix = &name[name.len() - suffix_len..];
                suffix[0] == b'.' && suffix[1..].eq_ignore_ascii_case(ext)
            }
        })
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArchiveFormat::Bz2 => "bz2",
            ArchiveFormat::Zstd => "zstd",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Compress(ArchiveFormat),
    Decompress(ArchiveFormat),
}

impl Mode {
    pub fn format(self) -> ArchiveFormat {
        match self {
            Mode::Compress(format) | Mode::Decompress(format) => format,
        }
    }
}

/// Picks the mode from the two paths. The target suffix wins when both are
/// archives, so `a.bz2 -> b.zst` compresses the `.bz2` bytes as they are.
///
/// Touches nothing on disk.
pub fn resolve(source: &Path, target: &Path) -> Result<Mode> {
    if let Some(format) = ArchiveFormat::from_path(target) {
        return Ok(Mode::Compress(format));
    }
    if let Some(format) = ArchiveFormat::from_path(source) {
        return Ok(Mode::Decompress(format));
    }
    Err(ArchiverError::UnrecognizedExtension {
        source_path: source.to_path_buf(),
        target_path: target.to_path_buf(),
    })
}
