use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::task::Options;

#[derive(Parser, Debug)]
#[command(
    name = "archiver",
    version,
    about = "Archiver/unarchiver for .bz2 (built in) and .zst (requires external zstd). Mode is inferred from filenames."
)]
pub struct CliArgs {
    /// Source file or directory (or archive to extract)
    pub source: PathBuf,

    /// Target file or directory. Ending in .bz2/.zst compresses; otherwise a .bz2/.zst source is decompressed into it
    pub target: PathBuf,

    /// Print elapsed time for the operation
    #[arg(short, long)]
    pub benchmark: bool,

    /// Show a small spinner while working
    #[arg(long)]
    pub spinner: bool,

    /// Overwrite the destination if it already exists
    #[arg(short, long)]
    pub force: bool,

    /// Compression level (bz2: 1-9, zstd: 1-19)
    #[arg(short, long)]
    pub level: Option<u32>,

    /// zstd executable used for .zst archives
    #[arg(long, env = "ARCHIVER_ZSTD", default_value = "zstd")]
    pub zstd_bin: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn options(&self) -> Options {
        Options {
            spinner: self.spinner,
            force: self.force,
            level: self.level,
            zstd_program: self.zstd_bin.clone().into_os_string(),
        }
    }
}
