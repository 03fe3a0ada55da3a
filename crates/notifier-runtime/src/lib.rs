//! Runtime layer for the log notifier.
//!
//! [`line_source`] follows the watched file on a blocking worker and hands
//! complete lines to [`follow_loop`], which matches them, dispatches
//! notifications and recovers from rotation until shutdown.

pub mod follow_loop;
pub mod line_source;
