//! Recursive directory walker with bounded asynchronous file dispatch
//!
//! The traversal thread recurses into subdirectories synchronously,
//! depth-first and pre-order; plain files become deferred tasks submitted
//! to the [`TaskPool`] through the wait-then-attempt backpressure protocol.
//! Only leaf file inspection is parallelized, which bounds peak memory to
//! roughly C x max-file-size.
//!
//! Filesystem anomalies are classified per entry: Skip and Ignore
//! dispositions keep the enumeration of siblings going, Fatal unwinds the
//! current directory's walk with a structured error. Symlinks are reported
//! and never followed, so a link cycle cannot loop the traversal.

use crate::error::{classify, Disposition, Result, WalkError};
use crate::parser::DeepParser;
use crate::pool::{Task, TaskPool};
use crate::sink::DiagnosticSink;
use crate::sniffer::{sniff, SniffResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared walk counters, updated by the traversal thread and by tasks
#[derive(Debug, Default)]
struct Counters {
    dirs: AtomicU64,
    files_submitted: AtomicU64,
    symlinks_skipped: AtomicU64,
    entries_skipped: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    bytes_accepted: AtomicU64,
    parse_errors: AtomicU64,
}

/// Snapshot of walk counters for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub dirs: u64,
    pub files_submitted: u64,
    pub symlinks_skipped: u64,
    pub entries_skipped: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub bytes_accepted: u64,
    pub parse_errors: u64,
}

/// Recursive walker dispatching file inspection to a task pool
pub struct Walker {
    sink: Arc<dyn DiagnosticSink>,
    parser: Arc<dyn DeepParser>,
    counters: Arc<Counters>,
}

impl Walker {
    pub fn new(sink: Arc<dyn DiagnosticSink>, parser: Arc<dyn DeepParser>) -> Self {
        Self {
            sink,
            parser,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Snapshot of the counters; call after the pool has drained for final
    /// numbers
    pub fn stats(&self) -> WalkStats {
        WalkStats {
            dirs: self.counters.dirs.load(Ordering::Relaxed),
            files_submitted: self.counters.files_submitted.load(Ordering::Relaxed),
            symlinks_skipped: self.counters.symlinks_skipped.load(Ordering::Relaxed),
            entries_skipped: self.counters.entries_skipped.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            bytes_accepted: self.counters.bytes_accepted.load(Ordering::Relaxed),
            parse_errors: self.counters.parse_errors.load(Ordering::Relaxed),
        }
    }

    /// Walk a directory tree rooted at `root`, submitting file tasks to
    /// `pool`
    ///
    /// Returns `Ok(())` when the traversal completes; already-submitted
    /// tasks may still be in flight, so callers join the pool before
    /// reading final stats.
    pub fn walk(&self, root: &Path, pool: &TaskPool) -> Result<()> {
        self.walk_dir(root, pool)
    }

    fn walk_dir(&self, path: &Path, pool: &TaskPool) -> Result<()> {
        self.sink
            .write_line(&format!("Entering dir: \"{}\".", path.display()));
        self.counters.dirs.fetch_add(1, Ordering::Relaxed);

        // Normalize away trailing separators before listing
        let path: PathBuf = path.components().collect();

        let read_dir = match fs::read_dir(&path) {
            Ok(rd) => rd,
            Err(e) => return self.enumeration_failed(&path, e),
        };

        let mut entries_seen = 0usize;
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => match classify(&e) {
                    Disposition::Skip => {
                        self.sink.write_line(skip_message(&e));
                        self.counters.entries_skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    Disposition::Ignore => continue,
                    Disposition::Fatal => {
                        let code = e.raw_os_error();
                        return Err(WalkError::Enumerate {
                            path,
                            code,
                            source: e,
                        });
                    }
                },
            };

            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            entries_seen += 1;

            let cur_path = entry.path();
            self.sink
                .write_line(&format!("Current path: \"{}\".", cur_path.display()));

            // One bad entry never aborts enumeration of its siblings
            if let Err(e) = self.process_entry(&cur_path, pool) {
                match disposition_of(&e) {
                    Disposition::Skip => {
                        self.sink.write_line(&skip_text_for(&e));
                        self.counters.entries_skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Disposition::Ignore => {}
                    Disposition::Fatal => return Err(e),
                }
            }
        }

        if entries_seen == 0 {
            self.sink.write_line("Directory is empty.");
        }

        Ok(())
    }

    /// Classify one entry and recurse, skip, or submit
    fn process_entry(&self, path: &Path, pool: &TaskPool) -> Result<()> {
        let metadata = fs::symlink_metadata(path).map_err(|e| WalkError::Entry {
            path: path.to_path_buf(),
            code: e.raw_os_error(),
            source: e,
        })?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            // Never followed, whether it points at a file or a directory
            self.sink.write_line("Skipping symlink.");
            self.counters.symlinks_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if file_type.is_dir() {
            return self.walk_dir(path, pool);
        }

        self.submit_file(path.to_path_buf(), pool);
        Ok(())
    }

    /// Build a deferred sniff-then-parse task and submit it under the
    /// backpressure protocol
    fn submit_file(&self, path: PathBuf, pool: &TaskPool) {
        let sink = Arc::clone(&self.sink);
        let parser = Arc::clone(&self.parser);
        let counters = Arc::clone(&self.counters);
        let label = path.display().to_string();

        let mut task = Task::new(label, move || {
            process_file(&path, sink.as_ref(), parser.as_ref(), &counters);
        });

        // A slot observed free by wait_for_slot may be claimed by another
        // submitter before queue_task runs; loop until admitted
        loop {
            pool.wait_for_slot();
            match pool.queue_task(task) {
                Ok(()) => break,
                Err(returned) => task = returned,
            }
        }

        self.counters.files_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn enumeration_failed(&self, path: &Path, err: io::Error) -> Result<()> {
        match classify(&err) {
            Disposition::Skip => {
                debug!("Listing {} skipped: {}", path.display(), err);
                if err.kind() == io::ErrorKind::NotFound {
                    self.sink.write_line("Directory is empty.");
                } else {
                    self.sink.write_line("Access denied to directory.");
                }
                Ok(())
            }
            Disposition::Ignore => Ok(()),
            Disposition::Fatal => {
                warn!("Listing {} failed: {}", path.display(), err);
                Err(WalkError::Enumerate {
                    path: path.to_path_buf(),
                    code: err.raw_os_error(),
                    source: err,
                })
            }
        }
    }
}

/// Task body: sniff, then hand accepted buffers to the deep parser
fn process_file(
    path: &Path,
    sink: &dyn DiagnosticSink,
    parser: &dyn DeepParser,
    counters: &Counters,
) {
    match sniff(path, parser) {
        SniffResult::Rejected(reason) => {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            sink.write_line(&format!("\"{}\": {}", path.display(), reason));
        }
        SniffResult::Accepted { buffer, size } => {
            counters.accepted.fetch_add(1, Ordering::Relaxed);
            counters
                .bytes_accepted
                .fetch_add(u64::from(size), Ordering::Relaxed);
            // Parser failures are reported, never fatal to the walk
            if let Err(e) = parser.parse(buffer, path) {
                counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                sink.write_line(&format!("\"{}\": deep parse failed: {}", path.display(), e));
            }
        }
    }
}

/// Disposition of an error raised while classifying or recursing into one
/// entry; listing failures arriving from recursion are already Fatal
fn disposition_of(err: &WalkError) -> Disposition {
    match err {
        WalkError::Entry { source, .. } => classify(source),
        _ => Disposition::Fatal,
    }
}

fn skip_text_for(err: &WalkError) -> String {
    match err {
        WalkError::Entry { source, .. } => skip_message(source).to_string(),
        other => format!("Skipping entry: {}.", other),
    }
}

/// Operator-facing text for a Skip-classified condition
fn skip_message(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::NotFound => "File not found.",
        io::ErrorKind::PermissionDenied => "Access denied.",
        // The only remaining Skip codes are the file-locked analogues
        _ => "Sharing violation.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::StructuralError;
    use crate::sink::MemorySink;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Parser accepting every buffer and recording parsed paths
    #[derive(Default)]
    struct RecordingParser {
        parsed: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl DeepParser for RecordingParser {
        fn validate_header(&self, _image: &[u8]) -> std::result::Result<(), StructuralError> {
            Ok(())
        }

        fn parse(&self, _image: Vec<u8>, path: &Path) -> std::result::Result<(), StructuralError> {
            self.parsed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    fn walk_tree(root: &Path) -> (Arc<MemorySink>, Arc<RecordingParser>, WalkStats) {
        let sink = Arc::new(MemorySink::new());
        let parser = Arc::new(RecordingParser::default());
        let walker = Walker::new(sink.clone(), parser.clone());
        let pool = TaskPool::new(2);
        walker.walk(root, &pool).unwrap();
        pool.join();
        (sink, parser, walker.stats())
    }

    #[test]
    fn test_walk_submits_files_and_recurses() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.exe", b"MZ payload");
        write_file(dir.path(), "b.txt", b"plain text");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_file(&sub, "c.exe", b"MZ more payload");

        let (sink, parser, stats) = walk_tree(dir.path());

        assert_eq!(stats.dirs, 2);
        assert_eq!(stats.files_submitted, 3);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);

        let parsed = parser.parsed.lock().unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.contains("Not a PE file (Pass 1).")));
    }

    #[test]
    fn test_empty_directory_reports_once() {
        let dir = TempDir::new().unwrap();
        let (sink, _, stats) = walk_tree(dir.path());

        let empties = sink
            .lines()
            .iter()
            .filter(|l| *l == "Directory is empty.")
            .count();
        assert_eq!(empties, 1);
        assert_eq!(stats.files_submitted, 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_are_never_followed() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        write_file(&real, "inner.exe", b"MZ data");
        // Cycle: real/loop -> real
        std::os::unix::fs::symlink(&real, real.join("loop")).unwrap();
        std::os::unix::fs::symlink(real.join("inner.exe"), dir.path().join("alias.exe")).unwrap();

        let (sink, _, stats) = walk_tree(dir.path());

        // The cycle terminated, both links were reported, and only the one
        // real file was submitted
        assert_eq!(stats.symlinks_skipped, 2);
        assert_eq!(stats.files_submitted, 1);
        assert_eq!(
            sink.lines()
                .iter()
                .filter(|l| *l == "Skipping symlink.")
                .count(),
            2
        );
    }

    #[test]
    fn test_missing_root_returns_normally() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("vanished");

        let sink = Arc::new(MemorySink::new());
        let parser = Arc::new(RecordingParser::default());
        let walker = Walker::new(sink.clone(), parser);
        let pool = TaskPool::new(1);

        // ENOENT on listing is Skip-classified: reported, not raised
        walker.walk(&gone, &pool).unwrap();
        pool.join();
        assert!(sink.lines().iter().any(|l| l == "Directory is empty."));
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_directory_reports_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        // Mode bits do not gate root; the denial can't be provoked there
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        write_file(dir.path(), "ok.exe", b"MZ data");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (sink, _, stats) = walk_tree(dir.path());

        // Restore so TempDir cleanup can remove it
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(sink
            .lines()
            .iter()
            .any(|l| l == "Access denied to directory."));
        assert_eq!(stats.files_submitted, 1);
    }

    #[test]
    fn test_walk_is_idempotent_over_unchanged_tree() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.exe", b"MZ payload");
        write_file(dir.path(), "b.txt", b"text");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_file(&sub, "c.bin", b"\x7fELF not a candidate");

        let (_, _, first) = walk_tree(dir.path());
        let (_, _, second) = walk_tree(dir.path());
        assert_eq!(first, second);
    }
}
