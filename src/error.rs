//! Error types and the filesystem error classifier
//!
//! This module defines:
//! - The structured error hierarchy for the walker (thiserror)
//! - The Skip/Ignore/Fatal disposition policy for raw OS errors
//!
//! Design philosophy:
//! - Per-file rejections are never errors; they are `SniffResult` variants
//! - Per-entry filesystem anomalies are classified and absorbed where
//!   recoverable; only Fatal dispositions unwind the traversal
//! - Unrecognized OS codes default to Fatal - fail loud rather than
//!   silently continuing on an unknown condition

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the pe-walker application
#[derive(Error, Debug)]
pub enum WalkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listing a directory failed with a non-recoverable OS error
    #[error("Failed to enumerate directory '{path}' (os error {code:?}): {source}")]
    Enumerate {
        path: PathBuf,
        code: Option<i32>,
        #[source]
        source: std::io::Error,
    },

    /// A single entry failed with a non-recoverable OS error
    #[error("Failed to process entry '{path}' (os error {code:?}): {source}")]
    Entry {
        path: PathBuf,
        code: Option<i32>,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside of enumeration (root resolution, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Root path missing or not a directory
    #[error("Invalid root path '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },
}

/// Result type alias for WalkError
pub type Result<T> = std::result::Result<T, WalkError>;

/// The classifier's verdict on a filesystem error observed mid-traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Report the condition and continue with the next entry
    Skip,

    /// Absorb silently; this is a normal condition, not an anomaly
    Ignore,

    /// Unwind the current directory's walk with a structured error
    Fatal,
}

/// Classify a raw OS error code into a disposition
///
/// Total over every code the walker's call sites can observe:
/// - vanished entry ("file not found") -> Skip
/// - permission problem ("access denied") -> Skip
/// - file locked by another process ("sharing violation") -> Skip
/// - enumeration exhausted ("no more entries") -> Ignore
/// - anything else -> Fatal
#[cfg(unix)]
pub fn classify_os(code: i32) -> Disposition {
    match code {
        libc::ENOENT => Disposition::Skip,
        libc::EACCES | libc::EPERM => Disposition::Skip,
        // Closest Unix analogues of a sharing violation
        libc::EBUSY | libc::ETXTBSY => Disposition::Skip,
        // No error recorded: the enumeration terminator surfaced as a code
        0 => Disposition::Ignore,
        _ => Disposition::Fatal,
    }
}

/// Classify a raw OS error code into a disposition (Windows error space)
#[cfg(windows)]
pub fn classify_os(code: i32) -> Disposition {
    const ERROR_FILE_NOT_FOUND: i32 = 2;
    const ERROR_PATH_NOT_FOUND: i32 = 3;
    const ERROR_ACCESS_DENIED: i32 = 5;
    const ERROR_NO_MORE_FILES: i32 = 18;
    const ERROR_SHARING_VIOLATION: i32 = 32;

    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => Disposition::Skip,
        ERROR_ACCESS_DENIED => Disposition::Skip,
        ERROR_SHARING_VIOLATION => Disposition::Skip,
        ERROR_NO_MORE_FILES | 0 => Disposition::Ignore,
        _ => Disposition::Fatal,
    }
}

/// Classify an `io::Error`, falling back on `ErrorKind` when the raw OS
/// code is unavailable (synthetic errors from higher layers)
pub fn classify(err: &std::io::Error) -> Disposition {
    if let Some(code) = err.raw_os_error() {
        return classify_os(code);
    }
    match err.kind() {
        std::io::ErrorKind::NotFound => Disposition::Skip,
        std::io::ErrorKind::PermissionDenied => Disposition::Skip,
        _ => Disposition::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_classify_recoverable_codes() {
        assert_eq!(classify_os(libc::ENOENT), Disposition::Skip);
        assert_eq!(classify_os(libc::EACCES), Disposition::Skip);
        assert_eq!(classify_os(libc::EPERM), Disposition::Skip);
        assert_eq!(classify_os(libc::EBUSY), Disposition::Skip);
        assert_eq!(classify_os(libc::ETXTBSY), Disposition::Skip);
    }

    #[test]
    fn test_classify_terminator_is_ignored() {
        assert_eq!(classify_os(0), Disposition::Ignore);
    }

    #[test]
    #[cfg(unix)]
    fn test_classify_unknown_code_is_fatal() {
        assert_eq!(classify_os(libc::EIO), Disposition::Fatal);
        assert_eq!(classify_os(9999), Disposition::Fatal);
    }

    #[test]
    fn test_classify_io_error_without_code() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(classify(&not_found), Disposition::Skip);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(classify(&denied), Disposition::Skip);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        assert_eq!(classify(&other), Disposition::Fatal);
    }

    #[test]
    #[cfg(unix)]
    fn test_classify_io_error_with_code() {
        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(classify(&err), Disposition::Skip);
    }
}
