mod bootstrap;

use std::sync::Arc;

use anyhow::{Context, Result};
use notifier_core::build_info::BuildInfo;
use notifier_core::notifications::DesktopNotifier;
use notifier_runtime::follow_loop::{FollowLoop, StopReason};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let build = BuildInfo::from_env();
    let settings = bootstrap::parse_settings(&build);

    bootstrap::setup_logging(&settings.log_level)?;

    let config = match bootstrap::follow_config(&settings) {
        Ok(config) => config,
        Err(e) => bootstrap::exit_with_usage(&e, &build),
    };

    let search = settings.search.as_deref().unwrap_or_default();
    println!("{}", build.banner(&config.path, search));

    tracing::info!(
        version = %build.version,
        keywords = ?config.keywords.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        ident = %config.ident,
        "Log Notifier starting"
    );

    let cancel = CancellationToken::new();
    let signals = bootstrap::spawn_shutdown_listener(cancel.clone());

    let notifier = Arc::new(DesktopNotifier::new(build.bundle_ident.clone()));
    let follow = FollowLoop::new(config, notifier);

    let report = follow.run(cancel).await.context("Failed to tail file")?;
    signals.abort();

    tracing::info!(
        lines = report.stats.lines_seen,
        notifications = report.stats.notifications_sent,
        failures = report.stats.notification_failures,
        reopens = report.stats.reopens,
        "follow loop stopped"
    );
    if report.stop_reason == StopReason::ReopenFailed {
        tracing::warn!("log file could not be reopened; no longer watching");
    }

    tracing::info!("Exiting lognotifier.");
    Ok(())
}
