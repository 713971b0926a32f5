//! Command-line front end for tree-dedupe

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tree_dedupe::{DedupeConfig, DedupeSession, UndedupeSession};

#[derive(Parser)]
#[command(name = "tree-dedupe")]
#[command(about = "Block-level deduplication across a file tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deduplicate every file under a folder
    Dedupe {
        /// Folder to deduplicate
        #[arg(default_value = ".")]
        folder: PathBuf,
        /// Upper bound on block-size search iterations
        search_iterations: Option<usize>,
        /// Block size to start the search from
        #[arg(long)]
        block_size: Option<usize>,
        /// Width in bytes of every length field in encoded files
        #[arg(long)]
        prefix_len: Option<u8>,
        /// Concurrent file workers
        #[arg(long)]
        max_workers: Option<usize>,
        /// Extra file suffixes to leave untouched
        #[arg(long = "exclude")]
        excluded_suffixes: Vec<String>,
    },
    /// Restore a single encoded file
    Undedupe {
        /// Encoded file to restore
        file: PathBuf,
        /// Folder to start the metadata lookup from, default the file's directory
        folder: Option<PathBuf>,
    },
    /// Restore every encoded file under a folder
    UndedupeAll {
        /// Folder to restore
        #[arg(default_value = ".")]
        folder: PathBuf,
        /// Concurrent file workers
        #[arg(long)]
        max_workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Dedupe {
            folder,
            search_iterations,
            block_size,
            prefix_len,
            max_workers,
            excluded_suffixes,
        } => {
            let mut config = DedupeConfig::default();
            if let Some(iterations) = search_iterations {
                config.search_iterations = iterations;
            }
            if let Some(block_size) = block_size {
                config.block_size = block_size;
            }
            if let Some(prefix_len) = prefix_len {
                config.prefix_len = prefix_len;
            }
            if let Some(max_workers) = max_workers {
                config.max_workers = max_workers;
            }
            config.excluded_suffixes.extend(excluded_suffixes);

            let report = DedupeSession::new(folder, config)?.run().await?;
            println!("{report}");
            Ok(exit_for(report.failures.len()))
        }
        Command::Undedupe { file, folder } => {
            let start = folder.unwrap_or_else(|| parent_or_here(&file));
            let stats = UndedupeSession::new(start, 1).run_single(&file).await?;
            println!("restored {} ({} bytes)", file.display(), stats.output_bytes);
            Ok(ExitCode::SUCCESS)
        }
        Command::UndedupeAll {
            folder,
            max_workers,
        } => {
            let workers = max_workers.unwrap_or_else(|| DedupeConfig::default().max_workers);
            let report = UndedupeSession::new(folder, workers).run_all().await?;
            println!("{report}");
            Ok(exit_for(report.failures.len()))
        }
    }
}

fn parent_or_here(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn exit_for(failures: usize) -> ExitCode {
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
