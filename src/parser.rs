//! Deep parser interface and the PE header collaborator
//!
//! The walker core treats structural interpretation of an accepted buffer
//! as an external concern behind the [`DeepParser`] trait: the sniffer uses
//! `validate_header` as its final plausibility stage, and the per-file task
//! calls `parse` only on accepted buffers. Any parser failure is caught and
//! reported by the task, never surfaced to the traversal.
//!
//! [`PeHeaderParser`] is the concrete collaborator shipped with the binary:
//! it validates the DOS header, follows `e_lfanew` to the NT headers,
//! checks the `PE\0\0` signature and the COFF machine against the current
//! process architecture, and dumps a one-line header summary.

use crate::sink::DiagnosticSink;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Offset of `e_lfanew` in the DOS header
const E_LFANEW_OFFSET: usize = 0x3C;

/// Minimum bytes for a DOS header
const DOS_HEADER_SIZE: usize = 64;

/// Size of the COFF file header that follows the PE signature
const COFF_HEADER_SIZE: usize = 20;

/// Errors from structural header interpretation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// Buffer ends before a required header field
    #[error("Image truncated: need {need} bytes at offset {offset}, have {have}")]
    Truncated {
        offset: usize,
        need: usize,
        have: usize,
    },

    /// DOS header does not start with MZ
    #[error("Missing MZ signature in DOS header")]
    BadDosMagic,

    /// NT headers do not start with PE\0\0
    #[error("Missing PE signature at e_lfanew offset {0:#x}")]
    BadNtSignature(usize),

    /// COFF machine field does not match the current architecture
    #[error("Machine {found:#06x} does not match current architecture {expected:#06x}")]
    WrongMachine { found: u16, expected: u16 },
}

/// External structural parser/dumper consumed by the walker core
pub trait DeepParser: Send + Sync {
    /// Cheap structural-header plausibility check; the sniffer's last stage
    fn validate_header(&self, image: &[u8]) -> Result<(), StructuralError>;

    /// Full structural parse of an accepted buffer; the buffer is owned by
    /// the call and released when it returns
    fn parse(&self, image: Vec<u8>, path: &Path) -> Result<(), StructuralError>;
}

/// COFF machine value for the architecture this process was built for
pub const fn current_machine() -> u16 {
    if cfg!(target_arch = "x86_64") {
        0x8664
    } else if cfg!(target_arch = "x86") {
        0x014C
    } else if cfg!(target_arch = "aarch64") {
        0xAA64
    } else {
        0
    }
}

/// PE header validator and dumper for the current process architecture
pub struct PeHeaderParser {
    sink: Arc<dyn DiagnosticSink>,
    machine: u16,
}

impl PeHeaderParser {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            machine: current_machine(),
        }
    }

    /// Override the expected machine (tests, cross-inspection)
    pub fn with_machine(sink: Arc<dyn DiagnosticSink>, machine: u16) -> Self {
        Self { sink, machine }
    }

    /// Locate the NT headers and return (pe_offset, machine, sections, timestamp)
    fn read_headers(&self, image: &[u8]) -> Result<(usize, u16, u16, u32), StructuralError> {
        if image.len() < DOS_HEADER_SIZE {
            return Err(StructuralError::Truncated {
                offset: 0,
                need: DOS_HEADER_SIZE,
                have: image.len(),
            });
        }
        if &image[..2] != b"MZ" {
            return Err(StructuralError::BadDosMagic);
        }

        let pe_offset = read_u32(image, E_LFANEW_OFFSET)? as usize;
        // PE signature (4) + COFF header must fit
        let need = pe_offset
            .checked_add(4 + COFF_HEADER_SIZE)
            .ok_or(StructuralError::BadNtSignature(pe_offset))?;
        if image.len() < need {
            return Err(StructuralError::Truncated {
                offset: pe_offset,
                need: 4 + COFF_HEADER_SIZE,
                have: image.len().saturating_sub(pe_offset),
            });
        }
        if &image[pe_offset..pe_offset + 4] != b"PE\0\0" {
            return Err(StructuralError::BadNtSignature(pe_offset));
        }

        let machine = read_u16(image, pe_offset + 4)?;
        let sections = read_u16(image, pe_offset + 6)?;
        let timestamp = read_u32(image, pe_offset + 8)?;
        Ok((pe_offset, machine, sections, timestamp))
    }
}

impl DeepParser for PeHeaderParser {
    fn validate_header(&self, image: &[u8]) -> Result<(), StructuralError> {
        let (_, machine, _, _) = self.read_headers(image)?;
        if machine != self.machine {
            return Err(StructuralError::WrongMachine {
                found: machine,
                expected: self.machine,
            });
        }
        Ok(())
    }

    fn parse(&self, image: Vec<u8>, path: &Path) -> Result<(), StructuralError> {
        let (pe_offset, machine, sections, timestamp) = self.read_headers(&image)?;
        self.sink.write_line(&format!(
            "PE image: \"{}\" ({} bytes, machine {:#06x}, {} sections, timestamp {:#010x}, headers at {:#x})",
            path.display(),
            image.len(),
            machine,
            sections,
            timestamp,
            pe_offset,
        ));
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, StructuralError> {
    let end = offset.checked_add(2).ok_or(StructuralError::Truncated {
        offset,
        need: 2,
        have: 0,
    })?;
    if buf.len() < end {
        return Err(StructuralError::Truncated {
            offset,
            need: 2,
            have: buf.len().saturating_sub(offset),
        });
    }
    Ok(u16::from_le_bytes([buf[offset], buf[offset + 1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, StructuralError> {
    let end = offset.checked_add(4).ok_or(StructuralError::Truncated {
        offset,
        need: 4,
        have: 0,
    })?;
    if buf.len() < end {
        return Err(StructuralError::Truncated {
            offset,
            need: 4,
            have: buf.len().saturating_sub(offset),
        });
    }
    Ok(u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

/// Build a minimal valid PE image for the given machine (test support)
#[cfg(test)]
pub(crate) fn minimal_pe(machine: u16) -> Vec<u8> {
    let pe_offset = 0x80usize;
    let mut image = vec![0u8; pe_offset + 4 + COFF_HEADER_SIZE];
    image[0] = b'M';
    image[1] = b'Z';
    image[E_LFANEW_OFFSET..E_LFANEW_OFFSET + 4]
        .copy_from_slice(&(pe_offset as u32).to_le_bytes());
    image[pe_offset..pe_offset + 4].copy_from_slice(b"PE\0\0");
    image[pe_offset + 4..pe_offset + 6].copy_from_slice(&machine.to_le_bytes());
    image[pe_offset + 6..pe_offset + 8].copy_from_slice(&3u16.to_le_bytes());
    image[pe_offset + 8..pe_offset + 12].copy_from_slice(&0x5F00_0000u32.to_le_bytes());
    image
}
