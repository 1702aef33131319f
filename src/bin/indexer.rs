use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use token_route_indexer::config::Config;
use token_route_indexer::coordinator::{
    BackfillOutcome, LiveOutcome, SyncCoordinator, SyncMode, shutdown_on,
};
use token_route_indexer::repository::{Database, MappingRegistry};
use token_route_indexer::rpc::{RpcClient, RpcSettings};
use token_route_indexer::source::ChainSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index cross-chain token mappings from router events", long_about = None)]
struct Cli {
    /// Run historical sync for every chain and exit without listening.
    #[arg(long, default_value = "false")]
    backfill_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Starting token route indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Networks: {} configured", config.networks.len());
    if config.networks.is_empty() {
        warn!("No networks configured; set <CHAIN>_RPC_URL and <CHAIN>_ROUTER");
    }

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let settings = RpcSettings {
        max_retries: config.rpc_max_retries,
        request_timeout: config.rpc_timeout,
        poll_interval: config.live_poll_interval,
    };
    let mut chains = ChainSet::new();
    for network in &config.networks {
        match RpcClient::new(network.chain_id, &network.rpc_urls, settings.clone()) {
            Ok(client) => chains.insert(network.chain_id, Arc::new(client)),
            Err(e) => error!("[{}] RPC client setup failed: {:#}", network.name, e),
        }
    }
    info!("RPC clients ready for {} chain(s)", chains.len());

    let coordinator = SyncCoordinator::new(config.networks.clone(), chains, MappingRegistry::new(db))
        .with_chunk_size(config.chunk_size)
        .with_request_delay(config.request_delay);

    let shutdown_rx = shutdown_on(tokio::signal::ctrl_c());

    let mode = if cli.backfill_only {
        SyncMode::BackfillOnly
    } else {
        SyncMode::Follow
    };
    let reports = coordinator.run(mode, shutdown_rx).await;

    for report in &reports {
        let backfill = match &report.backfill {
            BackfillOutcome::Skipped => "skipped".to_string(),
            BackfillOutcome::Completed(summary) => format!(
                "synced {}-{} ({} events, {} skipped)",
                summary.from_block, summary.to_block, summary.applied, summary.skipped
            ),
            BackfillOutcome::Failed(e) => format!("failed: {e}"),
        };
        let live = match &report.live {
            LiveOutcome::NotStarted => "not started".to_string(),
            LiveOutcome::Finished => "stopped".to_string(),
            LiveOutcome::Failed(e) => format!("failed: {e}"),
        };
        info!(
            "[{}][{}] backfill {}, listener {}",
            report.name, report.chain_id, backfill, live
        );
    }

    Ok(())
}
