//! Staged file sniffing pipeline
//!
//! Decides, with minimal I/O cost, whether a file is a plausible PE image
//! worth deep parsing. Stages run cheapest-first and short-circuit on the
//! first failure:
//!
//! 1. Open for binary read, positioned at end to obtain the size
//! 2. Size gate: strictly positive and representable as u32
//! 3. Two-byte `MZ` peek before any full read
//! 4. Exact-size buffer allocation (allocation failure is recoverable)
//! 5. Full read into the buffer
//! 6. Structural header validation by the deep parser
//!
//! The 2-byte peek before the allocation+read avoids pulling megabytes of
//! data for files that are trivially not candidates, which is the
//! overwhelming majority in a large tree. A rejection is a normal result
//! variant, never an error.

use crate::parser::DeepParser;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// The 2-byte magic signature a candidate file must start with
pub const MAGIC: [u8; 2] = *b"MZ";

/// Why a file was rejected by the sniffing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Could not open, or the file has no content
    EmptyOrUnreadable,

    /// Size does not fit in a u32; never silently truncated
    TooLarge,

    /// First two bytes are not `MZ`
    NoMagicSignature,

    /// Buffer of the file's exact size could not be allocated
    AllocationFailed,

    /// Fewer bytes were readable than the discovered size promised
    TruncatedRead,

    /// The structural header parser rejected the buffer
    StructurallyInvalid,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::EmptyOrUnreadable => "Empty or unreadable file.",
            RejectReason::TooLarge => "File too large to be a valid PE.",
            RejectReason::NoMagicSignature => "Not a PE file (Pass 1).",
            RejectReason::AllocationFailed => "WARNING! File too large to buffer.",
            RejectReason::TruncatedRead => "WARNING! Failed to read file data.",
            RejectReason::StructurallyInvalid => "Not a PE file or wrong architecture (Pass 2).",
        };
        f.write_str(msg)
    }
}

/// Outcome of sniffing one file
#[derive(Debug)]
pub enum SniffResult {
    /// The file is not a candidate; the reason is reported and the task ends
    Rejected(RejectReason),

    /// The file is a validated candidate; the buffer is owned by the task
    /// and handed by move to the deep parser
    Accepted { buffer: Vec<u8>, size: u32 },
}

impl SniffResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SniffResult::Accepted { .. })
    }
}

/// Run the staged sniffing pipeline on one file
pub fn sniff(path: &Path, parser: &dyn DeepParser) -> SniffResult {
    // Stage 1: open and obtain size from the end position
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("open failed for {}: {}", path.display(), e);
            return SniffResult::Rejected(RejectReason::EmptyOrUnreadable);
        }
    };
    let size = match file.seek(SeekFrom::End(0)) {
        Ok(n) => n,
        Err(_) => return SniffResult::Rejected(RejectReason::EmptyOrUnreadable),
    };

    // Stage 2: size gate
    if size == 0 {
        return SniffResult::Rejected(RejectReason::EmptyOrUnreadable);
    }
    if size > u64::from(u32::MAX) {
        return SniffResult::Rejected(RejectReason::TooLarge);
    }
    let size = size as u32;

    // Stage 3: 2-byte magic peek before committing to a full read
    if file.seek(SeekFrom::Start(0)).is_err() {
        return SniffResult::Rejected(RejectReason::TruncatedRead);
    }
    let mut magic = [0u8; 2];
    if file.read_exact(&mut magic).is_err() {
        return SniffResult::Rejected(RejectReason::TruncatedRead);
    }
    if magic != MAGIC {
        return SniffResult::Rejected(RejectReason::NoMagicSignature);
    }

    // Stage 4: allocate exactly `size` bytes; an oversized but
    // u32-representable file can still exhaust the address space, and that
    // is a per-file condition, not fatal to the walk
    if file.seek(SeekFrom::Start(0)).is_err() {
        return SniffResult::Rejected(RejectReason::TruncatedRead);
    }
    let mut buffer: Vec<u8> = Vec::new();
    if buffer.try_reserve_exact(size as usize).is_err() {
        return SniffResult::Rejected(RejectReason::AllocationFailed);
    }
    buffer.resize(size as usize, 0);

    // Stage 5: full read
    if file.read_exact(&mut buffer).is_err() {
        return SniffResult::Rejected(RejectReason::TruncatedRead);
    }

    // Stage 6: structural header plausibility
    if let Err(e) = parser.validate_header(&buffer) {
        debug!("structural check failed for {}: {}", path.display(), e);
        return SniffResult::Rejected(RejectReason::StructurallyInvalid);
    }

    SniffResult::Accepted { buffer, size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{minimal_pe, PeHeaderParser, StructuralError};
    use crate::sink::MemorySink;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Parser that accepts everything and counts validations
    struct CountingParser {
        validations: AtomicU64,
    }

    impl CountingParser {
        fn new() -> Self {
            Self {
                validations: AtomicU64::new(0),
            }
        }
    }

    impl DeepParser for CountingParser {
        fn validate_header(&self, _image: &[u8]) -> Result<(), StructuralError> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn parse(&self, _image: Vec<u8>, _path: &Path) -> Result<(), StructuralError> {
            Ok(())
        }
    }

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    fn pe_parser() -> PeHeaderParser {
        PeHeaderParser::with_machine(Arc::new(MemorySink::new()), 0x8664)
    }

    #[test]
    fn test_missing_file_is_empty_or_unreadable() {
        let dir = TempDir::new().unwrap();
        let result = sniff(&dir.path().join("nope.exe"), &pe_parser());
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::EmptyOrUnreadable)
        ));
    }

    #[test]
    fn test_empty_file_is_empty_or_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.exe", b"");
        let result = sniff(&path, &pe_parser());
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::EmptyOrUnreadable)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_oversize_file_rejected_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.bin");
        let f = File::create(&path).unwrap();
        // Sparse file: no data blocks are actually written
        f.set_len(u64::from(u32::MAX) + 1).unwrap();

        let result = sniff(&path, &pe_parser());
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::TooLarge)
        ));
    }

    #[test]
    fn test_wrong_magic_rejected_without_full_read() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", b"hello world, definitely not an image");

        let counting = CountingParser::new();
        let result = sniff(&path, &counting);
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::NoMagicSignature)
        ));
        // Stage 6 never ran: the file was dropped at the 2-byte peek
        assert_eq!(counting.validations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_byte_file_is_truncated_read() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "stub", b"M");
        let result = sniff(&path, &pe_parser());
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::TruncatedRead)
        ));
    }

    #[test]
    fn test_mz_without_pe_structure_is_structurally_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dos_stub.exe", b"MZ just a dos-era stub, no NT headers here");
        let result = sniff(&path, &pe_parser());
        assert!(matches!(
            result,
            SniffResult::Rejected(RejectReason::StructurallyInvalid)
        ));
    }

    #[test]
    fn test_valid_pe_accepted_with_exact_size() {
        let dir = TempDir::new().unwrap();
        let image = minimal_pe(0x8664);
        let path = write_file(&dir, "a.exe", &image);

        match sniff(&path, &pe_parser()) {
            SniffResult::Accepted { buffer, size } => {
                assert_eq!(size as usize, image.len());
                assert_eq!(buffer, image);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_mz_file_reaches_validator_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "b.exe", b"MZ followed by arbitrary payload bytes");

        let counting = CountingParser::new();
        let result = sniff(&path, &counting);
        assert!(result.is_accepted());
        assert_eq!(counting.validations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reject_reason_display_texts() {
        assert_eq!(
            RejectReason::NoMagicSignature.to_string(),
            "Not a PE file (Pass 1)."
        );
        assert_eq!(
            RejectReason::StructurallyInvalid.to_string(),
            "Not a PE file or wrong architecture (Pass 2)."
        );
    }
}
