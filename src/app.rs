use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tailserve::cron::{Scheduler, ShellDispatcher};
use tailserve::handler::LogtailHandler;
use tailserve::registry::StaticRegistry;
use tailserve::server::Server;

use crate::cli::Config;

/// Application runtime: wires the registry, HTTP interface and scheduler.
pub async fn run(config: Config) -> Result<()> {
    let registry = StaticRegistry::new(config.processes);
    info!(processes = registry.len(), "process registry loaded");
    if registry.is_empty() {
        warn!("no processes configured; every logtail request will answer 410");
    }
    let handler = LogtailHandler::new(Arc::new(registry)).with_head(config.head_bytes);

    let server = Server::bind(config.listen, handler)
        .await?
        .with_poll_interval(config.poll_interval);

    let shutdown = CancellationToken::new();

    let scheduler = Scheduler::new();
    for (schedule, command) in config.cron {
        scheduler.register(schedule, command);
    }
    let cron = tokio::spawn(scheduler.run(Arc::new(ShellDispatcher), shutdown.clone()));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for ctrl-c");
            return;
        }
        info!("shutting down");
        signal.cancel();
    });

    let res = server.run(shutdown.clone()).await;

    // Ensure the scheduler stops even if the server failed
    shutdown.cancel();
    if let Err(err) = cron.await {
        warn!(%err, "cron task failed");
    }
    res
}
