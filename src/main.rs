//! PAX withdrawal scanner
//!
//! Main entry point: scans every configured foreign chain for withdrawal
//! oprets and keeps the shared ledger, optionally serving it over the
//! status API.

use pax_bridge::api::{start_api_server, ApiState};
use pax_bridge::config::BridgeConfig;
use pax_bridge::pax::{Ledger, PriceOracle, WithdrawalScanner};
use pax_bridge::rpc::{ChainMode, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "pax.toml".to_string());
    let config = BridgeConfig::load(&path)?;
    info!(
        config = %path,
        reference = %config.reference.symbol,
        chains = config.chains.len(),
        "PAX scanner starting"
    );

    let embedded = std::iter::once(&config.reference)
        .chain(config.chains.iter())
        .find(|chain| chain.mode == ChainMode::EmbeddedFull);
    if let Some(chain) = embedded {
        return Err(format!(
            "{}: embedded_full needs an in-process node and is not available from the command line",
            chain.symbol
        )
        .into());
    }

    let reference = Arc::new(Router::new(config.reference.handle(), config.reference.timeout())?);
    let oracle = PriceOracle::new(reference);
    let ledger = Arc::new(Ledger::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    for chain in &config.chains {
        let router = Arc::new(Router::new(chain.handle(), chain.timeout())?);
        if router.mode() == ChainMode::EmbeddedLight {
            warn!(chain = %chain.symbol, "light mode: chain data is unavailable, scanner will idle");
        }
        let mut scanner = WithdrawalScanner::new(
            router,
            oracle.clone(),
            ledger.clone(),
            config.scan_config(chain),
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { scanner.run(shutdown).await }));
    }

    if let Some(port) = config.api.port {
        let state = Arc::new(ApiState {
            ledger: ledger.clone(),
            reference: config.reference.symbol.clone(),
            chains: config.chains.iter().map(|c| c.symbol.clone()).collect(),
        });
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = start_api_server(state, port, shutdown).await {
                error!(port, error = %e, "status API failed");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping scanners");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "worker task failed");
        }
    }

    info!(
        records = ledger.len(),
        pending = ledger.total_pending(),
        "PAX scanner stopped"
    );
    Ok(())
}
