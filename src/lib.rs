//! pe-walker - Recursive PE Candidate Scanner
//!
//! Walks a directory tree, identifies candidate PE image files with a
//! staged fail-fast sniffing pipeline, and dispatches each accepted
//! candidate to a deep header parser while keeping a bounded number of
//! inspections in flight.
//!
//! # Features
//!
//! - **Staged Sniffing**: Size gate, 2-byte `MZ` peek, full read, and
//!   structural header check, ordered cheapest-first so non-candidates
//!   cost almost no I/O.
//!
//! - **Bounded Concurrency**: A fixed-capacity task pool with an explicit
//!   wait-then-attempt backpressure protocol caps in-flight inspections,
//!   bounding peak memory to roughly C x max-file-size.
//!
//! - **Error Taxonomy**: Filesystem anomalies are classified Skip, Ignore,
//!   or Fatal; one vanished or locked entry never aborts the walk, while
//!   unknown conditions fail loud.
//!
//! - **Symlink Safety**: Links are reported and never followed, so cycles
//!   cannot loop the traversal.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Traversal Thread                          │
//! │   walk(root): depth-first, pre-order, synchronous recursion  │
//! │   per entry: classify -> recurse | skip symlink | submit     │
//! │                           │                                  │
//! │        wait_for_slot() ── │ ── queue_task() retry loop       │
//! │                           ▼                                  │
//! │            ┌──────────────────────────┐                      │
//! │            │        TaskPool          │                      │
//! │            │  C workers, rendezvous   │                      │
//! │            │  handoff (crossbeam)     │                      │
//! │            └───────────┬──────────────┘                      │
//! │                        ▼                                     │
//! │      sniff(path) ── Accepted ──> DeepParser::parse           │
//! │           │                                                  │
//! │           └── Rejected(reason) ──> DiagnosticSink            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Scan with 8 concurrent inspections
//! pe-walker /usr/lib -w 8
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod pool;
pub mod progress;
pub mod sink;
pub mod sniffer;
pub mod walker;

pub use config::{CliArgs, WalkConfig};
pub use error::{classify, classify_os, Disposition, Result, WalkError};
pub use parser::{DeepParser, PeHeaderParser, StructuralError};
pub use pool::{Task, TaskPool};
pub use sink::{DiagnosticSink, MemorySink, StdoutSink};
pub use sniffer::{sniff, RejectReason, SniffResult};
pub use walker::{WalkStats, Walker};
