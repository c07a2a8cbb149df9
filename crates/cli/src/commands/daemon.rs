//! Long-running modes: scheduler plus API, or API alone.

use anyhow::Result;
use cryptopulse_web_api::ApiServer;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use super::context::AppContext;

/// Runs every scheduled stage and serves the API until SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if a cron expression is invalid or the scheduler fails to start.
pub async fn run_daemon(ctx: AppContext) -> Result<()> {
    let addr = ctx.server_addr();
    info!(
        "Starting pipeline for {} with the API on {}",
        ctx.services.symbols.join(", "),
        addr
    );

    let mut scheduler = ctx.scheduler().start().await?;

    let server = ApiServer::new(ctx.api_state());
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(&addr).await {
            error!("Server error: {:#}", e);
        }
    });

    tokio::select! {
        result = shutdown_signal() => result?,
        _ = &mut server_handle => error!("Web API stopped unexpectedly"),
    }

    info!("Stopping scheduler...");
    if let Err(e) = scheduler.shutdown().await {
        error!("Error during scheduler shutdown: {}", e);
    }
    server_handle.abort();

    info!("Pipeline stopped");
    Ok(())
}

/// Serves the API without scheduling any stage.
///
/// # Errors
/// Returns an error if the address cannot be bound.
pub async fn run_server(ctx: AppContext, addr: Option<String>) -> Result<()> {
    let addr = addr.unwrap_or_else(|| ctx.server_addr());
    let server = ApiServer::new(ctx.api_state());

    tokio::select! {
        result = server.serve(&addr) => result?,
        result = shutdown_signal() => result?,
    }
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
    }
    Ok(())
}
