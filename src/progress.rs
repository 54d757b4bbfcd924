//! Banner and summary output for the scanner
//!
//! The per-entry diagnostic stream goes through the sink; this module only
//! prints the start banner and the end-of-walk summary block.

use crate::walker::WalkStats;
use console::style;
use humansize::{format_size, BINARY};
use std::time::Duration;

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the walk
pub fn print_header(root: &str, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("pe-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!();
}

/// Print a summary of the walk results
pub fn print_summary(stats: &WalkStats, duration: Duration) {
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.files_submitted as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Walk Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(stats.dirs)
    );
    println!(
        "  {} {}",
        style("Files sniffed:").bold(),
        format_number(stats.files_submitted)
    );
    println!(
        "  {} {} ({})",
        style("PE images:").bold(),
        format_number(stats.accepted),
        format_size(stats.bytes_accepted, BINARY)
    );
    println!(
        "  {} {}",
        style("Rejected:").bold(),
        format_number(stats.rejected)
    );
    if stats.symlinks_skipped > 0 {
        println!(
            "  {} {}",
            style("Symlinks skipped:").bold(),
            format_number(stats.symlinks_skipped)
        );
    }
    if stats.entries_skipped > 0 {
        println!(
            "  {} {}",
            style("Entries skipped:").yellow().bold(),
            format_number(stats.entries_skipped)
        );
    }
    if stats.parse_errors > 0 {
        println!(
            "  {} {}",
            style("Parse errors:").yellow().bold(),
            format_number(stats.parse_errors)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!();
}
