//! The follow loop: read lines, match keywords, notify, survive rotation.
//!
//! ```text
//! Starting ──► Running ──EndOfStream──► Reopening ──ok──► Running
//!                 │                        │
//!              cancel                 cancel / give up
//!                 ▼                        ▼
//!              Stopping ──────────────► Stopped
//! ```
//!
//! Only the initial open is fatal. Every wait races the shared
//! [`CancellationToken`]; a notification that is already being dispatched is
//! allowed to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notifier_core::error::Result;
use notifier_core::keywords::KeywordSet;
use notifier_core::notifications::Notifier;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::line_source::{LineSource, LogLine, Session, SourceEvent, DEFAULT_POLL_INTERVAL};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Wait before trying to reopen a file that stopped delivering lines.
pub const DEFAULT_REOPEN_DELAY: Duration = Duration::from_secs(2);

/// Reopen attempts per end-of-stream before the loop gives up.
pub const DEFAULT_REOPEN_ATTEMPTS: u32 = 1;

// ── Configuration ─────────────────────────────────────────────────────────────

/// How the loop recovers after the file is rotated, truncated or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReopenPolicy {
    /// Fixed wait before every attempt.
    pub delay: Duration,
    /// Attempts before the loop stops for good. Always at least one.
    pub max_attempts: u32,
}

impl Default for ReopenPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_REOPEN_DELAY,
            max_attempts: DEFAULT_REOPEN_ATTEMPTS,
        }
    }
}

/// Everything the loop needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct FollowConfig {
    /// File to follow.
    pub path: PathBuf,
    /// Search terms, checked in order.
    pub keywords: KeywordSet,
    /// Notification title.
    pub ident: String,
    pub reopen: ReopenPolicy,
    /// End-of-file poll interval for the line source.
    pub poll_interval: Duration,
}

impl FollowConfig {
    pub fn new(path: impl Into<PathBuf>, keywords: KeywordSet, ident: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            keywords,
            ident: ident.into(),
            reopen: ReopenPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_reopen(mut self, reopen: ReopenPolicy) -> Self {
        self.reopen = reopen;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

// ── State & report ────────────────────────────────────────────────────────────

/// Lifecycle of a [`FollowLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Starting,
    Running,
    Reopening,
    Stopping,
    Stopped,
}

/// Why [`FollowLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested.
    Cancelled,
    /// Every reopen attempt after an end-of-stream failed.
    ReopenFailed,
}

/// Counters collected while the loop runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowStats {
    pub lines_seen: u64,
    pub line_errors: u64,
    pub matches: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub reopens: u64,
}

/// Returned by [`FollowLoop::run`] after a clean stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowReport {
    pub stop_reason: StopReason,
    pub stats: FollowStats,
}

enum Reopen {
    Opened(Session),
    Cancelled,
    Failed,
}

// ── FollowLoop ────────────────────────────────────────────────────────────────

/// Owns the single open session on the watched file.
pub struct FollowLoop {
    config: FollowConfig,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<FollowState>,
    stats: FollowStats,
}

impl FollowLoop {
    pub fn new(config: FollowConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(FollowState::Starting);
        Self {
            config,
            notifier,
            state,
            stats: FollowStats::default(),
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<FollowState> {
        self.state.subscribe()
    }

    /// Follow the file until `cancel` fires or recovery is exhausted.
    ///
    /// Returns an error only if the file cannot be opened at startup.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<FollowReport> {
        let source = LineSource::new(&self.config.path, self.config.poll_interval);

        let mut session = match source.open(&cancel) {
            Ok(session) => session,
            Err(e) => {
                self.transition(FollowState::Stopped);
                return Err(e);
            }
        };
        info!(
            path = %self.config.path.display(),
            keywords = self.config.keywords.len(),
            "following log file"
        );
        self.transition(FollowState::Running);

        let stop_reason = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Received interrupt signal, shutting down...");
                    break StopReason::Cancelled;
                }
                event = session.next_line() => event,
            };

            match event {
                SourceEvent::Line(line) => self.handle_line(line, &cancel).await,
                SourceEvent::EndOfStream(end) => {
                    info!(
                        reason = %end,
                        delay_secs = self.config.reopen.delay.as_secs_f64(),
                        "log tailer stopped; attempting to reopen"
                    );
                    session.close().await;
                    self.transition(FollowState::Reopening);

                    match self.reopen(&source, &cancel).await {
                        Reopen::Opened(fresh) => {
                            session = fresh;
                            self.stats.reopens += 1;
                            self.transition(FollowState::Running);
                        }
                        Reopen::Cancelled => {
                            info!("Received interrupt signal, shutting down...");
                            break StopReason::Cancelled;
                        }
                        Reopen::Failed => break StopReason::ReopenFailed,
                    }
                }
            }
        };

        self.transition(FollowState::Stopping);
        session.close().await;
        self.transition(FollowState::Stopped);

        debug!(?stop_reason, stats = ?self.stats, "follow loop finished");
        Ok(FollowReport {
            stop_reason,
            stats: self.stats,
        })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn reopen(&self, source: &LineSource, cancel: &CancellationToken) -> Reopen {
        let policy = self.config.reopen;
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Reopen::Cancelled,
                _ = tokio::time::sleep(policy.delay) => {}
            }

            match source.open(cancel) {
                Ok(session) => {
                    info!(path = %source.path().display(), attempt, "reopened log file");
                    return Reopen::Opened(session);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Failed to re-open log file");
                }
            }
        }

        error!(
            path = %source.path().display(),
            attempts,
            "giving up on log file"
        );
        Reopen::Failed
    }

    async fn handle_line(&mut self, line: LogLine, cancel: &CancellationToken) {
        self.stats.lines_seen += 1;

        if let Some(err) = line.error.as_deref() {
            self.stats.line_errors += 1;
            warn!(error = %err, "Error reading line");
            return;
        }

        let text = line.text.trim();
        if text.is_empty() {
            return;
        }

        let Some(hit) = self.config.keywords.find_match(text) else {
            return;
        };
        let keyword = hit.keyword.as_str().to_string();
        let body = hit.body.to_string();
        self.stats.matches += 1;

        if cancel.is_cancelled() {
            debug!(%keyword, "match after shutdown request; not notifying");
            return;
        }

        self.dispatch(&keyword, body).await;
    }

    async fn dispatch(&mut self, keyword: &str, body: String) {
        let notifier = Arc::clone(&self.notifier);
        let title = self.config.ident.clone();
        let sent = body.clone();

        let outcome = tokio::task::spawn_blocking(move || notifier.notify(&title, &sent)).await;

        match outcome {
            Ok(Ok(())) => {
                self.stats.notifications_sent += 1;
                info!(%keyword, "Notified: {}", body);
            }
            Ok(Err(e)) => {
                self.stats.notification_failures += 1;
                warn!(%keyword, error = %e, "Notification error");
            }
            Err(e) => {
                self.stats.notification_failures += 1;
                warn!(%keyword, error = %e, "notification worker failed");
            }
        }
    }

    fn transition(&self, next: FollowState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "follow state");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
