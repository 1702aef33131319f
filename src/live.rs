use crate::applier::EventApplier;
use crate::events::{MappingEventKind, RawLog};
use crate::source::{ChainLogSource, LogStream};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Applies router events as the chain produces them. Delivery may repeat or
/// reorder events; the registry's keyed upserts absorb both.
pub struct LiveSyncListener {
    chain_id: u64,
    name: String,
    router: Address,
    source: Arc<dyn ChainLogSource>,
    applier: EventApplier,
}

impl LiveSyncListener {
    pub fn new(
        chain_id: u64,
        name: impl Into<String>,
        router: Address,
        source: Arc<dyn ChainLogSource>,
        applier: EventApplier,
    ) -> Self {
        Self {
            chain_id,
            name: name.into(),
            router,
            source,
            applier,
        }
    }

    /// Opens the subscription and spawns the consuming task. An error here
    /// means the chain has no live coverage.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let topics = vec![
            MappingEventKind::Added.signature(),
            MappingEventKind::Removed.signature(),
        ];
        let stream = self
            .source
            .subscribe(self.router, topics)
            .await
            .with_context(|| format!("Failed to subscribe to router on chain {}", self.chain_id))?;

        info!("[{}] Listening for events...", self.name);
        Ok(tokio::spawn(self.listen(stream, shutdown)))
    }

    async fn listen(self, mut stream: LogStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[{}] Listener stopping", self.name);
                        return;
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(log) => self.handle(log).await,
                        None => {
                            warn!("[{}] Event subscription ended", self.name);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, log: RawLog) {
        match self.applier.apply_logs(self.chain_id, std::slice::from_ref(&log)).await {
            Ok(stats) if stats.applied > 0 => {
                info!(
                    "[{}] Applied live event at block {} ({:?})",
                    self.name, log.block_number, log.transaction_hash
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    "[{}] Failed to apply live event at block {}: {:#}",
                    self.name, log.block_number, e
                );
            }
        }
    }
}
