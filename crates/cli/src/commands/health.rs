//! health CLI command: database liveness and provider call statistics.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use cryptopulse_web_api::{overall_status, ProviderHealth};

use super::context::AppContext;

/// Prints the same health view as `/api/health`.
///
/// # Errors
/// Returns an error when the database is unreachable.
pub async fn run_health(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();

    if let Err(e) = ctx.db.ping().await {
        println!("status:    {}", overall_status(false, &[]));
        println!("database:  unavailable ({e:#})");
        bail!("database unavailable");
    }

    let stats = ctx.repos.api_calls.stats_since(now - Duration::hours(1)).await?;
    let providers: Vec<ProviderHealth> = stats.iter().map(ProviderHealth::from_stats).collect();
    let signals = ctx
        .repos
        .signals
        .count_created_since(now - Duration::hours(24))
        .await?;

    println!("status:    {}", overall_status(true, &providers));
    println!("database:  ok");
    println!("providers: {}", ctx.services.market.provider_ids().join(" -> "));
    println!("signals in the last 24h: {signals}");
    if providers.is_empty() {
        println!("no provider calls in the last hour");
    }
    for p in &providers {
        println!(
            "  {:<12} {:<9} {:>4} calls  {:>5.1}% ok  {} timeouts  {:.0} ms avg",
            p.provider, p.status, p.calls, p.success_rate, p.timeouts, p.avg_latency_ms
        );
    }
    Ok(())
}
