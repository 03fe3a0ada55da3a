//! Domain layer for the log notifier.
//!
//! Holds the error type, command-line settings, build metadata, keyword
//! matching and the notifier abstraction. Nothing in here touches the
//! watched file or the async runtime.

pub mod build_info;
pub mod error;
pub mod keywords;
pub mod notifications;
pub mod settings;

pub use error::{NotifierError, Result};
