//! Follow a single growing file, one complete line at a time.
//!
//! [`LineSource::open`] positions a fresh handle at end-of-file and starts a
//! reader on tokio's blocking pool. The reader drains whatever has been
//! appended, then sleeps in short slices so a close request is seen promptly.
//! Lines travel to the [`Session`] over an unbounded channel.
//!
//! Before each read the reader checks that its handle is not shorter than
//! what it already consumed. When it reaches end-of-file it compares the path
//! on disk with the handle it holds. A missing path, a different device/inode
//! pair or a length shorter than what was already consumed all end the stream
//! with [`SourceEvent::EndOfStream`]; the caller decides whether to reopen.
//!
//! A truncation followed by a refill past the old read position within one
//! poll interval cannot be told apart from an append. The reader then resumes
//! mid-way through the new content.
//!
//! Bytes after the final newline are held back until the newline arrives and
//! are dropped if the stream ends first.

use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notifier_core::error::{NotifierError, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// How long the reader waits at end-of-file before looking again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on a single uninterrupted sleep inside the reader.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

// ── Public types ──────────────────────────────────────────────────────────────

/// One line appended to the watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Line text with the newline and trailing whitespace removed.
    pub text: String,
    /// Set when the raw bytes could not be decoded; `text` is then lossy.
    pub error: Option<String>,
}

impl LogLine {
    fn from_raw(raw: &[u8]) -> Self {
        match std::str::from_utf8(raw) {
            Ok(text) => Self {
                text: text.trim_end().to_string(),
                error: None,
            },
            Err(e) => Self {
                text: String::from_utf8_lossy(raw).trim_end().to_string(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Why a session stopped delivering lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The path no longer exists.
    Removed,
    /// The path now refers to a different file.
    Rotated,
    /// The file shrank below the read position.
    Truncated,
    /// Reading or stat-ing the file failed.
    ReadFailed,
}

impl std::fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamEnd::Removed => "removed",
            StreamEnd::Rotated => "rotated",
            StreamEnd::Truncated => "truncated",
            StreamEnd::ReadFailed => "read failed",
        };
        f.write_str(s)
    }
}

/// Item produced by [`Session::next_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Line(LogLine),
    EndOfStream(StreamEnd),
}

// ── LineSource ────────────────────────────────────────────────────────────────

/// Factory for [`Session`]s on a fixed path.
#[derive(Debug, Clone)]
pub struct LineSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl LineSource {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file and start following it from its current end.
    ///
    /// The reader stops when `cancel` fires or the session is closed.
    /// Fails with [`NotifierError::FileNotFound`] when the path does not
    /// exist. Must be called from within a tokio runtime.
    pub fn open(&self, cancel: &CancellationToken) -> Result<Session> {
        let mut file = File::open(&self.path).map_err(|e| NotifierError::from_open(&self.path, e))?;
        let consumed = file
            .seek(SeekFrom::End(0))
            .map_err(|e| NotifierError::from_open(&self.path, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| NotifierError::from_open(&self.path, e))?;

        debug!(path = %self.path.display(), offset = consumed, "session opened at end of file");

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = cancel.child_token();

        let reader = FileReader {
            path: self.path.clone(),
            reader: BufReader::new(file),
            identity: FileIdentity::of(&metadata),
            consumed,
            partial: Vec::new(),
            poll_interval: self.poll_interval,
            stop: stop.clone(),
            tx,
        };
        let handle = tokio::task::spawn_blocking(move || reader.run());

        Ok(Session {
            path: self.path.clone(),
            rx,
            stop,
            reader: Some(handle),
        })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One open handle on the watched file.
///
/// Dropping the session stops the reader, which lets go of the handle within
/// one stop-check slice. [`Session::close`] waits for that to happen.
pub struct Session {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<SourceEvent>,
    stop: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Wait for the next complete line or the end of the stream.
    ///
    /// Cancel-safe: dropping the future loses nothing. A closed session
    /// reports [`StreamEnd::ReadFailed`] immediately.
    pub async fn next_line(&mut self) -> SourceEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => SourceEvent::EndOfStream(StreamEnd::ReadFailed),
        }
    }

    /// Stop the reader and wait until it has released the file handle.
    /// Idempotent.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.stop.cancel();
            self.rx.close();
            if let Err(e) = reader.await {
                debug!(path = %self.path.display(), error = %e, "reader task failed");
            }
            debug!(path = %self.path.display(), "session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

// ── File identity ─────────────────────────────────────────────────────────────

/// What makes "the same file" across stat calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    created: Option<std::time::SystemTime>,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(metadata: &Metadata) -> Self {
        Self {
            created: metadata.created().ok(),
        }
    }
}

// ── Reader (blocking pool) ────────────────────────────────────────────────────

struct FileReader {
    path: PathBuf,
    reader: BufReader<File>,
    identity: FileIdentity,
    /// Bytes taken from the handle since it was opened, plus the start offset.
    consumed: u64,
    /// Bytes read after the last newline.
    partial: Vec<u8>,
    poll_interval: Duration,
    stop: CancellationToken,
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl FileReader {
    fn run(mut self) {
        loop {
            if self.stop.is_cancelled() {
                return;
            }

            if let Some(end) = self.check_handle() {
                self.finish(end);
                return;
            }
            if let Err(end) = self.drain() {
                self.finish(end);
                return;
            }
            if self.tx.is_closed() {
                return;
            }

            if let Some(end) = self.check_path() {
                self.finish(end);
                return;
            }

            if !self.pause() {
                return;
            }
        }
    }

    /// Read up to end-of-file, sending every complete line.
    fn drain(&mut self) -> std::result::Result<(), StreamEnd> {
        loop {
            match self.reader.read_until(b'\n', &mut self.partial) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.consumed += n as u64;
                    if self.partial.last() != Some(&b'\n') {
                        // Writer has not finished the line yet.
                        return Ok(());
                    }
                    self.partial.pop();
                    let line = LogLine::from_raw(&self.partial);
                    self.partial.clear();
                    trace!(len = line.text.len(), "line read");
                    if self.tx.send(SourceEvent::Line(line)).is_err() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "read failed");
                    return Err(StreamEnd::ReadFailed);
                }
            }
        }
    }

    /// Catch a truncation before reading from the old position.
    fn check_handle(&self) -> Option<StreamEnd> {
        match self.reader.get_ref().metadata() {
            Ok(m) if m.len() < self.consumed => Some(StreamEnd::Truncated),
            Ok(_) => None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "handle stat failed");
                Some(StreamEnd::ReadFailed)
            }
        }
    }

    /// Compare the path on disk with the handle we hold.
    fn check_path(&self) -> Option<StreamEnd> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Some(StreamEnd::Removed);
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "stat failed");
                return Some(StreamEnd::ReadFailed);
            }
        };

        if FileIdentity::of(&metadata) != self.identity {
            return Some(StreamEnd::Rotated);
        }
        if metadata.len() < self.consumed {
            return Some(StreamEnd::Truncated);
        }
        None
    }

    /// Sleep for one poll interval. Returns `false` if asked to stop.
    fn pause(&self) -> bool {
        let mut remaining = self.poll_interval;
        while !remaining.is_zero() {
            let slice = remaining.min(STOP_CHECK_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
            if self.stop.is_cancelled() {
                return false;
            }
        }
        true
    }

    fn finish(&self, end: StreamEnd) {
        debug!(
            path = %self.path.display(),
            reason = %end,
            dropped_partial = self.partial.len(),
            "end of stream"
        );
        let _ = self.tx.send(SourceEvent::EndOfStream(end));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);

    // ── helpers ───────────────────────────────────────────────────────────

    fn append(path: &Path, bytes: &[u8]) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .expect("open for append");
        f.write_all(bytes).expect("append");
        f.flush().expect("flush");
    }

    fn fixture(initial: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, initial).unwrap();
        (dir, path)
    }

    async fn next(session: &mut Session) -> SourceEvent {
        tokio::time::timeout(WAIT, session.next_line())
            .await
            .expect("timed out waiting for source event")
    }

    fn open(path: &Path) -> Session {
        LineSource::new(path, POLL)
            .open(&CancellationToken::new())
            .expect("open session")
    }

    fn line(text: &str) -> SourceEvent {
        SourceEvent::Line(LogLine {
            text: text.to_string(),
            error: None,
        })
    }

    // ── open ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_open_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = LineSource::new(dir.path().join("nope.log"), POLL);
        match source.open(&CancellationToken::new()) {
            Err(NotifierError::FileNotFound(p)) => assert!(p.ends_with("nope.log")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open should fail"),
        }
    }

    #[tokio::test]
    async fn test_existing_content_is_skipped() {
        let (_dir, path) = fixture("old ERROR line\nanother\n");
        let mut session = open(&path);

        append(&path, b"fresh line\n");
        assert_eq!(next(&mut session).await, line("fresh line"));
    }

    // ── line delivery ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_lines_arrive_in_order_and_trimmed() {
        let (_dir, path) = fixture("");
        let mut session = open(&path);

        append(&path, b"first  \r\nsecond\t\n\nthird\n");
        assert_eq!(next(&mut session).await, line("first"));
        assert_eq!(next(&mut session).await, line("second"));
        assert_eq!(next(&mut session).await, line(""));
        assert_eq!(next(&mut session).await, line("third"));
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let (_dir, path) = fixture("");
        let mut session = open(&path);

        append(&path, b"half a ");
        let early = tokio::time::timeout(Duration::from_millis(150), session.next_line()).await;
        assert!(early.is_err(), "incomplete line must not be delivered");

        append(&path, b"line\n");
        assert_eq!(next(&mut session).await, line("half a line"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_sets_error() {
        let (_dir, path) = fixture("");
        let mut session = open(&path);

        append(&path, b"bad \xff byte\n");
        match next(&mut session).await {
            SourceEvent::Line(l) => {
                assert!(l.error.is_some());
                assert!(l.text.starts_with("bad "));
                assert!(l.text.ends_with(" byte"));
            }
            other => panic!("expected a line, got {other:?}"),
        }
    }

    // ── end of stream ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_removal_ends_stream() {
        let (_dir, path) = fixture("x\n");
        let mut session = open(&path);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::Removed)
        );
    }

    #[tokio::test]
    async fn test_truncation_ends_stream() {
        let (_dir, path) = fixture("some existing content\n");
        let mut session = open(&path);

        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::Truncated)
        );
    }

    #[tokio::test]
    async fn test_shorter_refill_after_truncation_ends_stream() {
        let (_dir, path) = fixture("a long line of existing history\n");
        let mut session = LineSource::new(&path, Duration::from_millis(300))
            .open(&CancellationToken::new())
            .unwrap();

        // Truncate and refill within one poll interval.
        std::fs::write(&path, "ERROR x\n").unwrap();

        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::Truncated)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rotation_ends_stream_after_draining_old_file() {
        let (dir, path) = fixture("");
        let mut session = open(&path);

        append(&path, b"before rotate\n");
        assert_eq!(next(&mut session).await, line("before rotate"));

        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, "new file\n").unwrap();

        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::Rotated)
        );
    }

    // ── close ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_dir, path) = fixture("");
        let mut session = open(&path);
        assert!(session.is_open());

        session.close().await;
        session.close().await;
        assert!(!session.is_open());
        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::ReadFailed)
        );
    }

    #[cfg(target_os = "linux")]
    fn handles_open_on(path: &Path) -> usize {
        let target = std::fs::canonicalize(path).unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| std::fs::read_link(entry.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_close_releases_file_handle() {
        let (_dir, path) = fixture("");
        let mut session = open(&path);
        assert_eq!(handles_open_on(&path), 1);

        session.close().await;
        assert_eq!(handles_open_on(&path), 0);
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_reader() {
        let (_dir, path) = fixture("");
        let cancel = CancellationToken::new();
        let mut session = LineSource::new(&path, POLL).open(&cancel).unwrap();

        cancel.cancel();

        assert_eq!(
            next(&mut session).await,
            SourceEvent::EndOfStream(StreamEnd::ReadFailed)
        );
    }

    #[test]
    fn test_stream_end_display() {
        assert_eq!(StreamEnd::Removed.to_string(), "removed");
        assert_eq!(StreamEnd::Rotated.to_string(), "rotated");
        assert_eq!(StreamEnd::Truncated.to_string(), "truncated");
        assert_eq!(StreamEnd::ReadFailed.to_string(), "read failed");
    }
}
