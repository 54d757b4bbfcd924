//! pe-walker - Recursive PE Candidate Scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pe_walker::config::{CliArgs, WalkConfig};
use pe_walker::parser::PeHeaderParser;
use pe_walker::pool::TaskPool;
use pe_walker::progress::{print_header, print_summary};
use pe_walker::sink::{DiagnosticSink, StdoutSink};
use pe_walker::walker::Walker;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = WalkConfig::from_args(args).context("Invalid configuration")?;

    if config.show_banner {
        print_header(&config.root.display().to_string(), config.worker_count);
    }

    let start = Instant::now();

    let sink: Arc<dyn DiagnosticSink> = Arc::new(StdoutSink::new());
    let parser = Arc::new(PeHeaderParser::new(Arc::clone(&sink)));
    let pool = TaskPool::new(config.worker_count);
    let walker = Walker::new(sink, parser);

    // A fatal traversal error unwinds the walk, but already-submitted
    // tasks are not cancelled; drain the pool either way before reporting
    let result = walker.walk(&config.root, &pool);
    pool.join();

    let stats = walker.stats();
    if config.show_banner {
        print_summary(&stats, start.elapsed());
    }

    result.context("Walk failed")?;
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pe_walker=debug,warn")
    } else {
        EnvFilter::new("pe_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
