//! directcopy - whole-file copies that bypass the OS page cache.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use humansize::{format_size, BINARY};
use std::path::PathBuf;
use tracing::Level;

use directcopy::config::{DEFAULT_ALIGNMENT, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_LEN};
use directcopy::digest::{digest_file, verify_file};
use directcopy::{copy_file, CancelToken, CopyMode, CopyOptions, DigestAlgorithm};

#[derive(Parser, Debug)]
#[command(name = "directcopy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a file or block device with unbuffered I/O.
    Copy(CopyArgs),
    /// Print the digest of a file, optionally checking it.
    Hash(HashArgs),
}

#[derive(Args, Debug)]
struct CopyArgs {
    source: PathBuf,

    target: PathBuf,

    #[arg(short, long, default_value_t = CopyMode::Threaded)]
    mode: CopyMode,

    #[arg(short, long, default_value_t = DEFAULT_ALIGNMENT)]
    alignment: usize,

    #[arg(long, default_value_t = DEFAULT_BUFFER_LEN)]
    buffer_len: usize,

    #[arg(long, default_value_t = DEFAULT_BUFFER_COUNT)]
    buffer_count: usize,

    /// Continue an interrupted copy into an existing target.
    #[arg(short, long, default_value_t = false)]
    resumable: bool,

    #[arg(short, long, default_value_t = false)]
    overwrite: bool,

    /// Print the copy report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct HashArgs {
    path: PathBuf,

    #[arg(long, default_value_t = DigestAlgorithm::Sha256)]
    algorithm: DigestAlgorithm,

    #[arg(short, long, default_value_t = DEFAULT_ALIGNMENT)]
    alignment: usize,

    /// Expected digest in hex; exits with an error on mismatch.
    #[arg(long)]
    expect: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Copy(args) => run_copy(args),
        Command::Hash(args) => run_hash(args),
    }
}

fn run_copy(args: CopyArgs) -> Result<()> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Failed to set Ctrl+C handler")?;

    let options = CopyOptions::new()
        .with_mode(args.mode)
        .with_alignment(args.alignment)
        .with_buffer_len(args.buffer_len)
        .with_buffer_count(args.buffer_count)
        .resumable(args.resumable)
        .overwrite(args.overwrite);

    let report = copy_file(&args.source, &args.target, &options, &cancel).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            args.source.display(),
            args.target.display()
        )
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let secs = (report.elapsed_ms as f64 / 1000.0).max(0.001);
        println!(
            "Copied {} in {:.1}s ({}/s, {} mode)",
            format_size(report.bytes_copied, BINARY),
            secs,
            format_size((report.bytes_copied as f64 / secs) as u64, BINARY),
            report.mode
        );
        if report.resumed_from > 0 {
            println!("Resumed at {}", format_size(report.resumed_from, BINARY));
        }
    }
    Ok(())
}

fn run_hash(args: HashArgs) -> Result<()> {
    let digest = match &args.expect {
        Some(expected) => verify_file(&args.path, args.algorithm, args.alignment, expected),
        None => digest_file(&args.path, args.algorithm, args.alignment),
    }
    .with_context(|| format!("Failed to hash {}", args.path.display()))?;

    println!("{}  {}", digest, args.path.display());
    Ok(())
}
