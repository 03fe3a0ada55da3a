//! Desktop notification dispatch.
//!
//! The follow loop only sees the [`Notifier`] trait so tests can swap in a
//! recording double. [`DesktopNotifier`] hands the message to the host
//! notification service via `notify-rust`. Delivery is best-effort: callers
//! log failures and carry on.

use notify_rust::Notification;

use crate::error::{NotifierError, Result};

// ── Notifier ──────────────────────────────────────────────────────────────────

/// Something that can show a titled message to the operator.
pub trait Notifier: Send + Sync {
    /// Display `body` under `title`. Called at most once per matching line.
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        (**self).notify(title, body)
    }
}

// ── DesktopNotifier ───────────────────────────────────────────────────────────

/// Notifier backed by the operating system's notification centre.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    /// Application name / bundle identifier shown as the sender.
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();

        #[cfg(target_os = "macos")]
        {
            if let Err(e) = notify_rust::set_application(&app_name) {
                tracing::debug!(error = %e, app = %app_name, "could not register notification sender");
            }
        }

        Self { app_name }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        Notification::new()
            .summary(title)
            .body(body)
            .appname(&self.app_name)
            .show()
            .map(|_| ())
            .map_err(|e| NotifierError::Notification(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
