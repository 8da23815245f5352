//! Error types for archiver operations.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::mode::ArchiveFormat;

pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Everything that can abort a compress or decompress run.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// Neither path carries a `.bz2` or `.zst` suffix
    #[error(
        "cannot infer mode from '{}' -> '{}': target must end with .bz2/.zst to compress, or source must end with .bz2/.zst to decompress",
        source_path.display(),
        target_path.display()
    )]
    UnrecognizedExtension {
        source_path: PathBuf,
        target_path: PathBuf,
    },

    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("target exists: {}. Use --force to overwrite", path.display())]
    TargetExists { path: PathBuf },

    /// The external compressor could not be located
    #[error("{tool} command not found in PATH")]
    ExternalToolMissing { tool: String },

    #[error("{tool} failed with {status}{}", fmt_stderr(stderr))]
    SubprocessFailure {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unsupported compression level {level} for {format}")]
    InvalidLevel { format: ArchiveFormat, level: u32 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

fn fmt_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl ArchiverError {
    /// Process exit code reported by the binary for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ArchiverError::SourceNotFound { .. } => 2,
            ArchiverError::TargetExists { .. } => 3,
            ArchiverError::UnrecognizedExtension { .. } => 4,
            _ => 1,
        }
    }
}

/// Attaches a human-readable context string to `io::Result`s.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| ArchiverError::Io {
            context: f().into(),
            source,
        })
    }
}
