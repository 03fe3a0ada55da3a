use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the log notifier.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// The watched file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The watched file exists but could not be opened or positioned.
    #[error("Failed to open file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required command-line argument was not supplied.
    #[error("The -{0} parameter is required.")]
    MissingArgument(&'static str),

    /// The search string normalised to an empty keyword list.
    #[error("No valid keywords specified in -search.")]
    NoKeywords,

    /// The host notification facility rejected the request.
    #[error("Notification error: {0}")]
    Notification(String),
}

impl NotifierError {
    /// Classify an `open(2)` failure for `path`.
    ///
    /// `NotFound` maps to [`NotifierError::FileNotFound`]; everything else
    /// keeps its source under [`NotifierError::FileOpen`].
    pub fn from_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            NotifierError::FileNotFound(path)
        } else {
            NotifierError::FileOpen { path, source }
        }
    }
}

/// Convenience alias used throughout the notifier crates.
pub type Result<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_not_found() {
        let err = NotifierError::FileNotFound(PathBuf::from("/var/log/app.log"));
        assert_eq!(err.to_string(), "File not found: /var/log/app.log");
    }

    #[test]
    fn test_error_display_file_open() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = NotifierError::FileOpen {
            path: PathBuf::from("/root/secret.log"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to open file"));
        assert!(msg.contains("/root/secret.log"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_display_missing_argument() {
        let err = NotifierError::MissingArgument("log");
        assert_eq!(err.to_string(), "The -log parameter is required.");
    }

    #[test]
    fn test_error_display_no_keywords() {
        assert_eq!(
            NotifierError::NoKeywords.to_string(),
            "No valid keywords specified in -search."
        );
    }

    #[test]
    fn test_from_open_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = NotifierError::from_open("/tmp/x.log", io_err);
        assert!(matches!(err, NotifierError::FileNotFound(p) if p == PathBuf::from("/tmp/x.log")));
    }

    #[test]
    fn test_from_open_other_kind_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = NotifierError::from_open("/tmp/x.log", io_err);
        match err {
            NotifierError::FileOpen { path, source } => {
                assert_eq!(path, PathBuf::from("/tmp/x.log"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_error_display_notification() {
        let err = NotifierError::Notification("no notification daemon".to_string());
        assert_eq!(err.to_string(), "Notification error: no notification daemon");
    }
}
