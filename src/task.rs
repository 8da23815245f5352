//! One archiver invocation: resolve the mode, check the endpoints, then run
//! the packager and codec in the right order.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::compressor::{Codec, codec_for};
use crate::error::{ArchiverError, IoContext, Result};
use crate::mode::{self, ArchiveFormat, Mode};
use crate::packager;
use crate::progress::{ByteCounter, CountingReader, Spinner};

const SPINNER_PREFIX: &str = "Working";

#[derive(Debug, Clone)]
pub struct Options {
    pub spinner: bool,
    pub force: bool,
    pub level: Option<u32>,
    pub zstd_program: OsString,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            spinner: false,
            force: false,
            level: None,
            zstd_program: OsString::from("zstd"),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub mode: Mode,
    /// Bytes handed to the codec (the tar size for directory sources).
    pub bytes_in: u64,
    /// Bytes the codec produced.
    pub bytes_out: u64,
    /// Final file written, or the directory a tar was extracted into.
    pub destination: PathBuf,
    pub extracted: bool,
}

#[derive(Debug, Clone)]
pub struct Task {
    source: PathBuf,
    target: PathBuf,
    mode: Mode,
    options: Options,
}

impl Task {
    /// Resolves the mode up front; nothing on disk is touched yet.
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        options: Options,
    ) -> Result<Self> {
        let source = source.into();
        let target = target.into();
        let mode = mode::resolve(&source, &target)?;
        debug!(?mode, source = %source.display(), target = %target.display(), "resolved mode");
        Ok(Self {
            source,
            target,
            mode,
            options,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn run(&self) -> Result<Summary> {
        if !self.source.exists() {
            return Err(ArchiverError::SourceNotFound {
                path: self.source.clone(),
            });
        }
        match self.mode {
            Mode::Compress(format) => self.compress(format),
            Mode::Decompress(format) => self.decompress(format),
        }
    }

    fn compress(&self, format: ArchiveFormat) -> Result<Summary> {
        if self.target.exists() && !self.options.force {
            return Err(ArchiverError::TargetExists {
                path: self.target.clone(),
            });
        }

        // Held until the codec is done with it; dropping deletes the tar.
        let packed = if self.source.is_dir() {
            Some(packager::pack_directory(&self.source)?)
        } else {
            None
        };
        let input_path = packed.as_ref().map_or(self.source.as_path(), |tmp| tmp.path());

        let staged = stage_beside(&self.target)?;
        self.transform(format, input_path, &staged, |codec, input, output| {
            codec.compress(input, output, self.options.level)
        })?;

        let bytes_in = file_len(input_path)?;
        let bytes_out = file_len(staged.path())?;
        persist(staged, &self.target)?;

        Ok(Summary {
            mode: self.mode,
            bytes_in,
            bytes_out,
            destination: self.target.clone(),
            extracted: false,
        })
    }

    fn decompress(&self, format: ArchiveFormat) -> Result<Summary> {
        let target_is_dir = self.target.is_dir();
        if self.target.exists() && !target_is_dir && !self.options.force {
            return Err(ArchiverError::TargetExists {
                path: self.target.clone(),
            });
        }

        let staged = if target_is_dir {
            stage_in(&self.target)?
        } else {
            stage_beside(&self.target)?
        };
        self.transform(format, &self.source, &staged, |codec, input, output| {
            codec.decompress(input, output)
        })?;

        let bytes_in = file_len(&self.source)?;
        let bytes_out = file_len(staged.path())?;

        if packager::is_tar(staged.path())? {
            debug!(target = %self.target.display(), "decompressed stream is a tar archive");
            packager::unpack(staged.path(), &self.target)?;
            return Ok(Summary {
                mode: self.mode,
                bytes_in,
                bytes_out,
                destination: self.target.clone(),
                extracted: true,
            });
        }

        let destination = if target_is_dir {
            let dest = self.target.join(output_name(&self.source));
            if dest.exists() && !self.options.force {
                return Err(ArchiverError::TargetExists { path: dest });
            }
            dest
        } else {
            self.target.clone()
        };
        persist(staged, &destination)?;

        Ok(Summary {
            mode: self.mode,
            bytes_in,
            bytes_out,
            destination,
            extracted: false,
        })
    }

    /// Streams `input_path` through `op` into `staged`, with the spinner
    /// running only for the duration of the codec call.
    fn transform<F>(
        &self,
        format: ArchiveFormat,
        input_path: &Path,
        staged: &NamedTempFile,
        op: F,
    ) -> Result<()>
    where
        F: FnOnce(&dyn Codec, &mut (dyn Read + Send), &mut dyn Write) -> Result<()>,
    {
        let codec = codec_for(format, self.options.zstd_program.clone());
        let input = File::open(input_path)
            .io_context(|| format!("failed to open {}", input_path.display()))?;
        let counter = ByteCounter::new();
        let mut reader = CountingReader::new(BufReader::new(input), counter.clone());
        let mut writer = BufWriter::new(staged.as_file());

        let spinner = Spinner::new(SPINNER_PREFIX, self.options.spinner).start(counter);
        op(codec.as_ref(), &mut reader, &mut writer)?;
        spinner.stop();

        writer
            .flush()
            .io_context(|| format!("failed to write {}", staged.path().display()))
    }
}

fn file_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .io_context(|| format!("failed to stat {}", path.display()))?
        .len())
}

/// Name used when a plain file is decompressed into an existing directory:
/// the source's file name minus its last extension.
fn output_name(source: &Path) -> OsString {
    source
        .file_stem()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("decompressed"))
}

/// Temporary file in the same directory as `path`, so the final rename
/// never crosses filesystems. Missing parent directories are created.
fn stage_beside(path: &Path) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .io_context(|| format!("failed to create {}", parent.display()))?;
    stage_in(parent)
}

fn stage_in(dir: &Path) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".archiver-");
    // Same mode a plain `File::create` gets (0666 minus umask) instead of
    // tempfile's owner-only default, since the file is renamed into place.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let staged = builder
        .tempfile_in(dir)
        .io_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    debug!(staged = %staged.path().display(), "staging output");
    Ok(staged)
}

fn persist(staged: NamedTempFile, destination: &Path) -> Result<()> {
    debug!(destination = %destination.display(), "persisting output");
    staged
        .persist(destination)
        .map_err(|e| e.error)
        .io_context(|| format!("failed to write {}", destination.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unrecognized_paths_fail_before_io() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("out.txt");
        let err = Task::new("missing.txt", &target, Options::default()).unwrap_err();
        assert!(matches!(err, ArchiverError::UnrecognizedExtension { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let tmp = tempdir().unwrap();
        let task = Task::new(
            tmp.path().join("nope.txt"),
            tmp.path().join("nope.txt.bz2"),
            Options::default(),
        )
        .unwrap();
        let err = task.run().unwrap_err();
        assert!(matches!(err, ArchiverError::SourceNotFound { .. }));
    }

    #[test]
    fn output_name_strips_last_extension() {
        assert_eq!(output_name(Path::new("a/report.txt.bz2")), "report.txt");
        assert_eq!(output_name(Path::new("dir.tar.zst")), "dir.tar");
    }

    #[test]
    fn failed_compress_leaves_no_target() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("in.txt");
        fs::write(&source, "payload").unwrap();
        let target = tmp.path().join("in.txt.bz2");
        let options = Options {
            level: Some(42),
            ..Options::default()
        };
        let err = Task::new(&source, &target, options).unwrap().run().unwrap_err();
        assert!(matches!(err, ArchiverError::InvalidLevel { .. }));
        assert!(!target.exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![OsString::from("in.txt")]);
    }

    #[test]
    fn stage_beside_creates_missing_parents() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("a/b/out.bz2");
        let staged = stage_beside(&target).unwrap();
        assert_eq!(staged.path().parent(), Some(tmp.path().join("a/b").as_path()));
    }
}
