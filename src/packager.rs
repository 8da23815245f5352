//! Tar wrapping for directory sources and unwrapping for directory targets.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tar::{Archive, Builder, Header};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{IoContext, Result};

const BLOCK_SIZE: usize = 512;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

/// Writes an uncompressed tar of `dir` to a temporary `archiver_*.tar`.
///
/// Entries are rooted at the directory's own name, so packing `photos/`
/// yields `photos/...` inside the archive. The walk is sorted and symlinks
/// are stored as links. The file is deleted when the handle drops.
pub fn pack_directory(dir: &Path) -> Result<NamedTempFile> {
    let root = archive_root(dir)?;
    let tmp = tempfile::Builder::new()
        .prefix("archiver_")
        .suffix(".tar")
        .tempfile()
        .io_context(|| "failed to create temporary tar file")?;
    debug!(dir = %dir.display(), tar = %tmp.path().display(), "packing directory");

    let mut builder = Builder::new(BufWriter::new(tmp.as_file()));
    builder.follow_symlinks(false);

    let mut entries = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry
            .map_err(io::Error::from)
            .io_context(|| format!("failed to walk {}", dir.display()))?;
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = if rel.as_os_str().is_empty() {
            root.clone()
        } else {
            root.join(rel)
        };
        trace!(entry = %name.display(), "adding to tar");

        let appended = if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), &name)
        };
        appended.io_context(|| format!("failed to add {} to tar", entry.path().display()))?;
        entries += 1;
    }

    builder
        .into_inner()
        .io_context(|| "failed to finalize tar archive")?
        .flush()
        .io_context(|| "failed to flush tar archive")?;
    debug!(entries, "tar archive ready");
    Ok(tmp)
}

fn archive_root(dir: &Path) -> Result<PathBuf> {
    let canonical =
        fs::canonicalize(dir).io_context(|| format!("failed to resolve {}", dir.display()))?;
    let name = canonical
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("archive"));
    Ok(PathBuf::from(name))
}

/// Whether the file at `path` starts with a valid tar header block.
pub fn is_tar(path: &Path) -> Result<bool> {
    let mut file =
        File::open(path).io_context(|| format!("failed to open {}", path.display()))?;
    let mut block = [0u8; BLOCK_SIZE];
    match file.read_exact(&mut block) {
        Ok(()) => Ok(is_tar_header(&block)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).io_context(|| format!("failed to read {}", path.display())),
    }
}

fn is_tar_header(block: &[u8; BLOCK_SIZE]) -> bool {
    // An empty name means an end-of-archive block or plain zeros.
    if block[0] == 0 {
        return false;
    }
    let Ok(stored) = Header::from_byte_slice(block).cksum() else {
        return false;
    };
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if CHECKSUM_FIELD.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(*b)
            }
        })
        .sum();
    stored == computed
}

/// Extracts the tar at `tar_path` into `dir`, creating it if needed.
pub fn unpack(tar_path: &Path, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).io_context(|| format!("failed to create {}", dir.display()))?;
    let file =
        File::open(tar_path).io_context(|| format!("failed to open {}", tar_path.display()))?;
    let mut archive = Archive::new(BufReader::new(file));
    archive
        .unpack(dir)
        .io_context(|| format!("failed to extract into {}", dir.display()))?;
    debug!(dir = %dir.display(), "extraction complete");
    Ok(())
}
