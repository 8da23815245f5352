use std::process::ExitCode;

use anyhow::Context;
use archiver::cli::CliArgs;
use archiver::progress::Stopwatch;
use archiver::{ArchiverError, Mode, Summary, Task};
use clap::Parser;
use colored::*;
use indicatif::HumanBytes;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    let stopwatch = Stopwatch::start();
    let outcome = run(&args);
    let code = match outcome {
        Ok(summary) => {
            print_summary(&summary);
            0
        }
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            err.downcast_ref::<ArchiverError>()
                .map_or(1, ArchiverError::exit_code)
        }
    };

    if args.benchmark {
        println!("{}", stopwatch.report().magenta());
    }
    ExitCode::from(code as u8)
}

fn run(args: &CliArgs) -> anyhow::Result<Summary> {
    let task = Task::new(&args.source, &args.target, args.options())?;
    let summary = task
        .run()
        .with_context(|| format!("{} failed", describe(task.mode())))?;
    Ok(summary)
}

fn describe(mode: Mode) -> String {
    match mode {
        Mode::Compress(format) => format!("{format} compression"),
        Mode::Decompress(format) => format!("{format} decompression"),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,archiver={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn print_summary(summary: &Summary) {
    let size_line = format!(
        "{} -> {}",
        HumanBytes(summary.bytes_in),
        HumanBytes(summary.bytes_out)
    );
    match summary.mode {
        Mode::Compress(_) => {
            let ratio = if summary.bytes_in == 0 {
                0.0
            } else {
                summary.bytes_out as f64 / summary.bytes_in as f64 * 100.0
            };
            println!(
                "{} {} ({}, {:.2}%)",
                "Compressed to".bold().green(),
                summary.destination.display(),
                size_line.blue(),
                ratio
            );
        }
        Mode::Decompress(_) if summary.extracted => {
            println!(
                "{} {} ({})",
                "Extracted into".bold().green(),
                summary.destination.display(),
                size_line.blue()
            );
        }
        Mode::Decompress(_) => {
            println!(
                "{} {} ({})",
                "Decompressed to".bold().green(),
                summary.destination.display(),
                size_line.blue()
            );
        }
    }
}
