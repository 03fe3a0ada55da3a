use std::time::Duration;

use clap::error::ErrorKind;
use notifier_core::build_info::BuildInfo;
use notifier_core::error::NotifierError;
use notifier_core::settings::Settings;
use notifier_runtime::follow_loop::{FollowConfig, ReopenPolicy};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── CLI bootstrap ──────────────────────────────────────────────────────────────

/// Parse the process arguments, exiting on `--help`, `--version` or a bad flag.
pub fn parse_settings(build: &BuildInfo) -> Settings {
    match Settings::try_parse_args(std::env::args_os()) {
        Ok(settings) => settings,
        Err(e) => {
            let code = cli_exit_code(&e);
            match e.kind() {
                ErrorKind::DisplayHelp => eprintln!("{}", Settings::usage(build)),
                ErrorKind::DisplayVersion => {
                    let _ = e.print();
                }
                _ => {
                    let _ = e.print();
                    eprintln!();
                    eprintln!("{}", Settings::usage(build));
                }
            }
            std::process::exit(code);
        }
    }
}

/// Exit status for a flag-parsing failure: 0 for help/version, 1 otherwise.
pub fn cli_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Print a startup error and the usage text, then exit with status 1.
pub fn exit_with_usage(err: &NotifierError, build: &BuildInfo) -> ! {
    eprintln!("Error: {err}");
    eprintln!("{}", Settings::usage(build));
    std::process::exit(1);
}

/// Validate the required flags and assemble the follow-loop configuration.
pub fn follow_config(settings: &Settings) -> notifier_core::Result<FollowConfig> {
    let path = settings.log_path()?.to_path_buf();
    let keywords = settings.keywords()?;
    let reopen = ReopenPolicy {
        delay: Duration::from_secs(settings.reopen_delay),
        max_attempts: settings.reopen_attempts,
    };
    Ok(FollowConfig::new(path, keywords, settings.ident.clone()).with_reopen(reopen))
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` value to an [`EnvFilter`] directive.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr so stdout carries only the startup banner.
/// `RUST_LOG`, when set, takes precedence over `log_level`.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .init();

    Ok(())
}

// ── Signal bootstrap ───────────────────────────────────────────────────────────

/// Cancel `cancel` on the first SIGINT / SIGTERM (Ctrl+C off Unix).
pub fn spawn_shutdown_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::debug!("shutdown signal received");
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM; Ctrl+C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
