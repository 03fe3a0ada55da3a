//! Build metadata and the startup banner.

use std::path::Path;

/// Bundle identifier attached to desktop notifications.
pub const DEFAULT_BUNDLE_IDENT: &str = "com.example.lognotifier";

/// Version and packaging details, populated once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub build_time: String,
    pub bundle_ident: String,
}

impl BuildInfo {
    /// Metadata baked in at compile time.
    ///
    /// `LOGNOTIFIER_BUILD_TIME` may be set by the release pipeline; it reads
    /// `unknown` otherwise.
    pub fn from_env() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_time: option_env!("LOGNOTIFIER_BUILD_TIME")
                .unwrap_or("unknown")
                .to_string(),
            bundle_ident: DEFAULT_BUNDLE_IDENT.to_string(),
        }
    }

    /// One-line description used at the top of the usage text.
    pub fn usage_line(&self) -> String {
        format!(
            "Version: {} (built {}, bundleIdent {})",
            self.version, self.build_time, self.bundle_ident
        )
    }

    /// The three-line banner printed to stdout once startup succeeds.
    pub fn banner(&self, log_path: &Path, search: &str) -> String {
        format!(
            "Log Notifier v{} (built {})\nWatching file: {}\nSearching for: {:?}",
            self.version,
            self.build_time,
            log_path.display(),
            search
        )
    }
}
