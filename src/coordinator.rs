use crate::applier::EventApplier;
use crate::config::NetworkConfig;
use crate::historical::{HistoricalSync, ResumePoint, SyncSummary, resolve_resume_point};
use crate::live::LiveSyncListener;
use crate::metadata::TokenMetadataResolver;
use crate::repository::{MappingRegistry, Network};
use crate::source::{ChainLogSource, ChainSet};
use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Historical sync, then live listening until shutdown.
    Follow,
    /// Historical sync only.
    BackfillOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Skipped,
    Completed(SyncSummary),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveOutcome {
    NotStarted,
    /// The listener ran and has since stopped.
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub chain_id: u64,
    pub name: String,
    pub backfill: BackfillOutcome,
    pub live: LiveOutcome,
}

/// Returns a flag that flips to `true` once `signal` resolves. If the signal
/// cannot be installed the flag stays down and the sender is kept alive, so
/// listeners never mistake the failure for a shutdown.
pub fn shutdown_on<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("Failed to install shutdown signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// Runs the resume → historical → live sequence for every configured chain,
/// each in its own task. A chain's failure is reported, never propagated.
pub struct SyncCoordinator {
    networks: Vec<NetworkConfig>,
    chains: ChainSet,
    applier: EventApplier,
    chunk_size: u64,
    request_delay: Duration,
}

struct ChainTask {
    network: NetworkConfig,
    source: Option<Arc<dyn ChainLogSource>>,
    applier: EventApplier,
    chunk_size: u64,
    request_delay: Duration,
}

impl SyncCoordinator {
    pub fn new(networks: Vec<NetworkConfig>, chains: ChainSet, registry: MappingRegistry) -> Self {
        let resolver = Arc::new(TokenMetadataResolver::new(chains.clone()));
        Self {
            networks,
            chains,
            applier: EventApplier::new(registry, resolver),
            chunk_size: crate::historical::DEFAULT_CHUNK_SIZE,
            request_delay: crate::historical::DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    /// Completes once every chain task has ended: immediately after backfill
    /// in `BackfillOnly` mode, otherwise when listeners stop.
    pub async fn run(&self, mode: SyncMode, shutdown: watch::Receiver<bool>) -> Vec<ChainReport> {
        let mut tasks = JoinSet::new();

        for network in &self.networks {
            let task = ChainTask {
                network: network.clone(),
                source: self.chains.log_source(network.chain_id),
                applier: self.applier.clone(),
                chunk_size: self.chunk_size,
                request_delay: self.request_delay,
            };
            let span = info_span!("chain", chain_id = network.chain_id, name = %network.name);
            tasks.spawn(task.run(mode, shutdown.clone()).instrument(span));
        }

        let mut reports = Vec::with_capacity(self.networks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("Chain task aborted: {}", e),
            }
        }

        reports.sort_by_key(|r| {
            self.networks
                .iter()
                .position(|n| n.chain_id == r.chain_id)
                .unwrap_or(usize::MAX)
        });
        reports
    }
}

impl ChainTask {
    async fn run(self, mode: SyncMode, shutdown: watch::Receiver<bool>) -> ChainReport {
        let chain_id = self.network.chain_id;
        let name = self.network.name.clone();
        info!("[{}][{}] --- Starting sync ---", name, chain_id);

        let backfill = match self.backfill(&shutdown).await {
            Ok(Some(summary)) => {
                info!("[{}][{}] Historical sync finished", name, chain_id);
                BackfillOutcome::Completed(summary)
            }
            Ok(None) => BackfillOutcome::Skipped,
            Err(e) => {
                error!("[{}][{}] Historical sync failed: {:#}", name, chain_id, e);
                BackfillOutcome::Failed(format!("{e:#}"))
            }
        };

        let live = if mode == SyncMode::BackfillOnly || *shutdown.borrow() {
            LiveOutcome::NotStarted
        } else {
            match self.listen(shutdown).await {
                Ok(()) => LiveOutcome::Finished,
                Err(e) => {
                    error!("[{}][{}] Failed to start listener: {:#}", name, chain_id, e);
                    LiveOutcome::Failed(format!("{e:#}"))
                }
            }
        };

        ChainReport {
            chain_id,
            name,
            backfill,
            live,
        }
    }

    fn source(&self) -> Result<Arc<dyn ChainLogSource>> {
        self.source
            .clone()
            .ok_or_else(|| anyhow!("No RPC endpoint for chain {}", self.network.chain_id))
    }

    async fn backfill(&self, shutdown: &watch::Receiver<bool>) -> Result<Option<SyncSummary>> {
        let network = &self.network;
        let registry = self.applier.registry();

        registry
            .upsert_network(Network {
                chain_id: network.chain_id,
                name: network.name.clone(),
                router_address: network.router_address,
                last_synced_block: network.initial_watermark(),
            })
            .await
            .context("Failed to register network")?;

        let watermark = registry.watermark(network.chain_id).await?;
        let resume = resolve_resume_point(watermark, network.start_block);

        let engine = HistoricalSync::new(
            network.chain_id,
            network.name.clone(),
            network.router_address,
            self.source()?,
            self.applier.clone(),
        )
        .with_chunk_size(self.chunk_size)
        .with_request_delay(self.request_delay);

        let Some(from_block) = engine.start_block(resume).await? else {
            info!("[{}] Config start block is zero, skipping historical sync", network.name);
            return Ok(None);
        };

        // observing from the head: the block just read is the whole range
        if resume == ResumePoint::Head {
            return Ok(Some(SyncSummary {
                from_block,
                to_block: from_block,
                ..Default::default()
            }));
        }

        info!("[{}] Syncing from block {}...", network.name, from_block);
        engine.run(from_block, shutdown).await.map(Some)
    }

    async fn listen(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = LiveSyncListener::new(
            self.network.chain_id,
            self.network.name.clone(),
            self.network.router_address,
            self.source()?,
            self.applier.clone(),
        );
        let handle = listener.start(shutdown).await?;
        if let Err(e) = handle.await {
            error!("[{}] Listener task aborted: {}", self.network.name, e);
        }
        Ok(())
    }
}
