//! Configuration types for pe-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Recursive PE candidate scanner
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pe-walker",
    version,
    about = "Recursively scan a directory tree for PE images and dump their headers",
    long_about = "Walks a directory tree depth-first, sniffing each plain file with a staged,\n\
                  fail-fast pipeline (size gate, MZ magic peek, full read, structural header\n\
                  check) and dispatching accepted candidates to the deep header parser.\n\
                  At most N inspections are in flight at a time; symlinks are never followed.",
    after_help = "EXAMPLES:\n    \
        pe-walker /usr/lib\n    \
        pe-walker C:\\Windows\\System32 -w 8\n    \
        pe-walker ./drop -w 2 -v"
)]
pub struct CliArgs {
    /// Root directory to scan
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Number of file inspections kept in flight
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Quiet mode - suppress the banner and summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show debug-level tracing)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Resolved root directory
    pub root: PathBuf,

    /// Pool capacity C
    pub worker_count: usize,

    /// Print the banner and summary blocks
    pub show_banner: bool,

    /// Debug-level tracing requested
    pub verbose: bool,
}

impl WalkConfig {
    /// Validate CLI arguments into a runnable configuration
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        let metadata =
            std::fs::metadata(&args.root).map_err(|e| ConfigError::InvalidRoot {
                path: args.root.clone(),
                reason: e.to_string(),
            })?;
        if !metadata.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: args.root,
                reason: "not a directory".to_string(),
            });
        }

        Ok(Self {
            root: args.root,
            worker_count: args.workers,
            show_banner: !args.quiet,
            verbose: args.verbose,
        })
    }
}
