use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;

use bzip2::Compression;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use tracing::debug;

use crate::error::{ArchiverError, IoContext, Result};
use crate::mode::ArchiveFormat;

const CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

const BZ2_LEVELS: RangeInclusive<u32> = 1..=9;
const BZ2_DEFAULT_LEVEL: u32 = 9;
const ZSTD_LEVELS: RangeInclusive<u32> = 1..=19;

/// Byte-level transform behind one archive format.
///
/// Input is `Send` so an out-of-process codec can feed it from a helper
/// thread while the caller's thread drains the result.
pub trait Codec {
    fn format(&self) -> ArchiveFormat;

    fn compress(
        &self,
        input: &mut (dyn Read + Send),
        output: &mut dyn Write,
        level: Option<u32>,
    ) -> Result<()>;

    fn decompress(&self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()>;
}

/// Codec for `format`. `zstd_program` names the external executable and is
/// only consulted for `.zst`.
pub fn codec_for(format: ArchiveFormat, zstd_program: impl Into<OsString>) -> Box<dyn Codec> {
    match format {
        ArchiveFormat::Bz2 => Box::new(Bz2Codec),
        ArchiveFormat::Zstd => Box::new(ZstdCodec::new(zstd_program)),
    }
}

fn check_level(
    format: ArchiveFormat,
    level: Option<u32>,
    allowed: RangeInclusive<u32>,
) -> Result<Option<u32>> {
    match level {
        Some(level) if !allowed.contains(&level) => {
            Err(ArchiverError::InvalidLevel { format, level })
        }
        other => Ok(other),
    }
}

/// In-process bzip2.
pub struct Bz2Codec;

impl Codec for Bz2Codec {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Bz2
    }

    fn compress(
        &self,
        input: &mut (dyn Read + Send),
        output: &mut dyn Write,
        level: Option<u32>,
    ) -> Result<()> {
        let level = check_level(ArchiveFormat::Bz2, level, BZ2_LEVELS)?.unwrap_or(BZ2_DEFAULT_LEVEL);
        let mut encoder = BzEncoder::new(output, Compression::new(level));
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = input.read(&mut buffer).io_context(|| "failed to read input")?;
            if n == 0 {
                break;
            }
            encoder
                .write_all(&buffer[..n])
                .io_context(|| "failed to write bz2 stream")?;
        }
        encoder
            .finish()
            .io_context(|| "failed to finish bz2 stream")?
            .flush()
            .io_context(|| "failed to flush bz2 stream")
    }

    fn decompress(&self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()> {
        // Multi-stream so pbzip2-style concatenated archives decode fully.
        let mut decoder = MultiBzDecoder::new(input);
        io::copy(&mut decoder, output).io_context(|| "failed to decompress bz2 stream")?;
        output.flush().io_context(|| "failed to flush output")
    }
}

/// zstd driven through the external `zstd` executable over stdin/stdout.
pub struct ZstdCodec {
    program: OsString,
}

impl ZstdCodec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn tool_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Full path of the executable, or `ExternalToolMissing`.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| ArchiverError::ExternalToolMissing {
            tool: self.tool_name(),
        })
    }

    fn pipe(
        &self,
        args: &[String],
        input: &mut (dyn Read + Send),
        output: &mut dyn Write,
    ) -> Result<()> {
        let exe = self.locate()?;
        debug!(exe = %exe.display(), ?args, "spawning zstd");

        let mut command = Command::new(&exe);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = ChildGuard::spawn(&mut command, &self.tool_name())?;
        let (stdin, mut stdout, stderr) = child.take_pipes()?;

        let (fed, drained, stderr_text) = thread::scope(|scope| {
            let feeder = scope.spawn(move || -> io::Result<u64> {
                let mut stdin = stdin;
                let copied = io::copy(input, &mut stdin)?;
                // Closing stdin is what tells zstd the input is complete.
                drop(stdin);
                Ok(copied)
            });
            let collector = scope.spawn(move || {
                let mut stderr = stderr;
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            });

            let drained = io::copy(&mut stdout, output).and_then(|n| output.flush().map(|_| n));
            if drained.is_err() {
                // Unblock the feeder: a child stuck on a full stdout pipe
                // would otherwise never read the rest of stdin.
                child.kill();
            }
            drop(stdout);

            let fed = feeder
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            let stderr_text = collector
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (fed, drained, stderr_text)
        });

        let status = child
            .wait()
            .io_context(|| format!("failed to wait for {}", self.tool_name()))?;
        // A write failure on our side is the root cause even if the kill
        // above made the exit status non-zero.
        drained.io_context(|| "failed to write zstd output")?;
        if !status.success() {
            return Err(ArchiverError::SubprocessFailure {
                tool: self.tool_name(),
                status,
                stderr: stderr_text,
            });
        }
        fed.io_context(|| "failed to feed input to zstd")?;
        Ok(())
    }
}

impl Codec for ZstdCodec {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zstd
    }

    fn compress(
        &self,
        input: &mut (dyn Read + Send),
        output: &mut dyn Write,
        level: Option<u32>,
    ) -> Result<()> {
        let level = check_level(ArchiveFormat::Zstd, level, ZSTD_LEVELS)?;
        let mut args = vec!["-q".to_string(), "-c".to_string()];
        if let Some(level) = level {
            args.push(format!("-{level}"));
        }
        self.pipe(&args, input, output)
    }

    fn decompress(&self, input: &mut (dyn Read + Send), output: &mut dyn Write) -> Result<()> {
        let args = ["-q", "-d", "-c"].map(String::from);
        self.pipe(&args, input, output)
    }
}

/// Owns a spawned child until it has been waited on. Dropping it early
/// kills and reaps the process, so no exit path leaves a zombie behind.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn spawn(command: &mut Command, tool: &str) -> Result<Self> {
        let child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ArchiverError::ExternalToolMissing {
                    tool: tool.to_string(),
                }
            } else {
                ArchiverError::Io {
                    context: format!("failed to spawn {tool}"),
                    source,
                }
            }
        })?;
        Ok(Self {
            child,
            reaped: false,
        })
    }

    fn take_pipes(&mut self) -> Result<(ChildStdin, ChildStdout, ChildStderr)> {
        let missing = || io::Error::new(io::ErrorKind::BrokenPipe, "child pipe not captured");
        let stdin = self.child.stdin.take().ok_or_else(missing);
        let stdout = self.child.stdout.take().ok_or_else(missing);
        let stderr = self.child.stderr.take().ok_or_else(missing);
        Ok((
            stdin.io_context(|| "zstd stdin")?,
            stdout.io_context(|| "zstd stdout")?,
            stderr.io_context(|| "zstd stderr")?,
        ))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
    }

    fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        self.reaped = true;
        status
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
