use crate::applier::EventApplier;
use crate::events::MappingEventKind;
use crate::source::ChainLogSource;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Where historical sync for a chain begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Start block configured as `0`: no backfill at all.
    Skip,
    /// Backfill from this block.
    From(u64),
    /// Nothing persisted and nothing configured: observe from the head.
    Head,
}

pub fn resolve_resume_point(watermark: u64, start_block: Option<u64>) -> ResumePoint {
    match start_block {
        Some(0) => ResumePoint::Skip,
        _ if watermark > 0 => ResumePoint::From(watermark + 1),
        Some(start) => ResumePoint::From(start),
        None => ResumePoint::Head,
    }
}

/// Splits `[from_block, to_block]` into ascending inclusive chunks of
/// `chunk_size` blocks. Empty when `from_block >= to_block`.
pub fn chunk_ranges(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    if from_block >= to_block {
        return ranges;
    }

    let mut start = from_block;
    loop {
        let end = start.saturating_add(chunk_size - 1).min(to_block);
        ranges.push((start, end));
        if end == to_block {
            break;
        }
        start = end + 1;
    }

    ranges
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub chunks: usize,
    pub applied: usize,
    pub skipped: usize,
    /// Stopped early on shutdown.
    pub interrupted: bool,
}

/// Chunked backfill of one chain's router events.
pub struct HistoricalSync {
    chain_id: u64,
    name: String,
    router: Address,
    source: Arc<dyn ChainLogSource>,
    applier: EventApplier,
    chunk_size: u64,
    request_delay: Duration,
}

impl HistoricalSync {
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
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    /// Block to start from for `resume`, or `None` when backfill is skipped.
    pub async fn start_block(&self, resume: ResumePoint) -> Result<Option<u64>> {
        match resume {
            ResumePoint::Skip => Ok(None),
            ResumePoint::From(block) => Ok(Some(block)),
            ResumePoint::Head => {
                let head = self
                    .source
                    .current_block_number()
                    .await
                    .with_context(|| format!("Failed to read head of chain {}", self.chain_id))?;
                info!("[{}] No start block configured, using latest block {}", self.name, head);
                Ok(Some(head))
            }
        }
    }

    /// Backfills `[from_block, head]` where `head` is read once up front.
    /// The watermark is advanced after each chunk; a failed chunk leaves it
    /// at the previous chunk's end.
    pub async fn run(&self, from_block: u64, shutdown: &watch::Receiver<bool>) -> Result<SyncSummary> {
        let to_block = self
            .source
            .current_block_number()
            .await
            .with_context(|| format!("Failed to read head of chain {}", self.chain_id))?;

        let mut summary = SyncSummary {
            from_block,
            to_block,
            ..Default::default()
        };

        if from_block >= to_block {
            info!("[{}] Already caught up at block {}", self.name, to_block);
            return Ok(summary);
        }

        info!(
            "[{}] Syncing from block {} to {} ({} blocks)",
            self.name,
            from_block,
            to_block,
            to_block - from_block
        );

        let ranges = chunk_ranges(from_block, to_block, self.chunk_size);
        let last = ranges.len() - 1;

        for (i, (start, end)) in ranges.into_iter().enumerate() {
            if *shutdown.borrow() {
                info!("[{}] Shutdown requested, stopping before block {}", self.name, start);
                summary.interrupted = true;
                break;
            }

            let chunk_start = Instant::now();
            let stats = self.sync_chunk(start, end).await?;

            self.applier
                .registry()
                .advance_watermark(self.chain_id, end)
                .await
                .with_context(|| format!("Failed to checkpoint chain {} at {}", self.chain_id, end))?;

            summary.chunks += 1;
            summary.applied += stats.applied;
            summary.skipped += stats.skipped;
            debug!(
                "[{}] Checkpointed block {} in {:?}",
                self.name,
                end,
                chunk_start.elapsed()
            );

            if i < last && !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }
        }

        info!(
            "[{}] Sync complete. Last block: {} ({} events applied, {} skipped)",
            self.name, to_block, summary.applied, summary.skipped
        );
        Ok(summary)
    }

    async fn sync_chunk(&self, start: u64, end: u64) -> Result<crate::applier::ApplyStats> {
        info!("[{}] Processing blocks {} to {}", self.name, start, end);

        let mut logs = Vec::new();
        for kind in [MappingEventKind::Added, MappingEventKind::Removed] {
            let fetched = self
                .source
                .get_logs(self.router, kind.signature(), start, end)
                .await
                .with_context(|| {
                    format!(
                        "Failed to fetch {:?} logs for blocks {}-{} on chain {}",
                        kind, start, end, self.chain_id
                    )
                })?;
            if !fetched.is_empty() {
                info!("[{}] Found {} {:?} event(s)", self.name, fetched.len(), kind);
            }
            logs.extend(fetched);
        }

        // apply in chain order so add/remove pairs inside one chunk settle correctly
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        self.applier.apply_logs(self.chain_id, &logs).await
    }
}
