use crate::events::{MappingEvent, MappingEventKind, RawLog, decode_mapping_event};
use crate::metadata::TokenMetadataResolver;
use crate::repository::{MappingKey, MappingRegistry, Token};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Applies decoded router events from one source chain to the registry.
/// Historical and live sync share this path.
#[derive(Clone)]
pub struct EventApplier {
    registry: MappingRegistry,
    resolver: Arc<TokenMetadataResolver>,
}

impl EventApplier {
    pub fn new(registry: MappingRegistry, resolver: Arc<TokenMetadataResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Decodes and applies `logs` in order. Undecodable logs are skipped;
    /// registry failures abort the batch.
    pub async fn apply_logs(&self, src_chain_id: u64, logs: &[RawLog]) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();

        for log in logs {
            match decode_mapping_event(log) {
                Ok(event) => {
                    self.apply(src_chain_id, &event).await?;
                    stats.applied += 1;
                }
                Err(e) => {
                    warn!(
                        "Chain {}: skipping log {:?}#{} at block {}: {}",
                        src_chain_id, log.transaction_hash, log.log_index, log.block_number, e
                    );
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    pub async fn apply(&self, src_chain_id: u64, event: &MappingEvent) -> Result<()> {
        let key = MappingKey {
            src_token: event.src_token,
            src_chain_id,
            dst_token: event.dst_token,
            dst_chain_id: event.dst_chain_id,
        };

        match event.kind {
            MappingEventKind::Added => {
                debug!(
                    "Processing mapping: {:?} -> {:?} (chain {}) at block {}",
                    key.src_token, key.dst_token, key.dst_chain_id, event.block_number
                );
                self.store_token(key.src_token, key.src_chain_id).await?;
                self.store_token(key.dst_token, key.dst_chain_id).await?;

                self.registry
                    .upsert_mapping(key, event.block_number, event.tx_hash, true)
                    .await
                    .with_context(|| format!("Failed to store mapping {key:?}"))?;
                info!(
                    "Stored mapping {:?} ({}) -> {:?} ({})",
                    key.src_token, key.src_chain_id, key.dst_token, key.dst_chain_id
                );
            }
            MappingEventKind::Removed => {
                let existed = self
                    .registry
                    .deactivate_mapping(key, event.block_number, event.tx_hash)
                    .await
                    .with_context(|| format!("Failed to deactivate mapping {key:?}"))?;
                if existed {
                    info!(
                        "Deactivated mapping {:?} ({}) -> {:?} ({})",
                        key.src_token, key.src_chain_id, key.dst_token, key.dst_chain_id
                    );
                } else {
                    debug!("Removal of unknown mapping {:?} ignored", key);
                }
            }
        }

        Ok(())
    }

    async fn store_token(&self, address: Address, chain_id: u64) -> Result<()> {
        let token = match self.resolver.resolve(address, chain_id).await {
            Some(token) => token,
            None => {
                warn!(
                    "No metadata source for {:?} on chain {}, storing bare token",
                    address, chain_id
                );
                Token::bare(address, chain_id)
            }
        };
        self.registry
            .upsert_token(token)
            .await
            .with_context(|| format!("Failed to store token {address:?} on chain {chain_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::source::ChainSet;
    use crate::test_utils::{MockLogSource, MockTokenReader, indexed_log, packed_log};
    use alloy_primitives::address;

    const SRC: Address = address!("0x5555555555555555555555555555555555555555");
    const DST: Address = address!("0x6666666666666666666666666666666666666666");

    fn applier(chains: ChainSet) -> EventApplier {
        let registry = MappingRegistry::new(Database::new(":memory:").unwrap());
        EventApplier::new(registry, Arc::new(TokenMetadataResolver::new(chains)))
    }

    fn key() -> MappingKey {
        MappingKey {
            src_token: SRC,
            src_chain_id: 1,
            dst_token: DST,
            dst_chain_id: 8453,
        }
    }

    #[tokio::test]
    async fn bad_log_does_not_abort_batch() {
        let applier = applier(ChainSet::new());
        let mut broken = indexed_log(MappingEventKind::Added, 8453, DST, SRC, 9, 0);
        broken.topics.truncate(3);
        let logs = vec![broken, indexed_log(MappingEventKind::Added, 8453, DST, SRC, 10, 0)];

        let stats = applier.apply_logs(1, &logs).await.unwrap();

        assert_eq!(stats, ApplyStats { applied: 1, skipped: 1 });
        let mapping = applier.registry().get_mapping(key()).await.unwrap().unwrap();
        assert!(mapping.is_active);
        assert_eq!(mapping.block_number, 10);
    }

    #[tokio::test]
    async fn added_event_stores_both_tokens() {
        let mut chains = ChainSet::new();
        chains.insert_parts(
            1,
            Arc::new(MockLogSource::new(0)),
            Arc::new(MockTokenReader::new().with_token(SRC, "USDC", "USD Coin", 6)),
        );
        let applier = applier(chains);

        applier
            .apply_logs(1, &[packed_log(MappingEventKind::Added, 8453, DST, SRC, 3, 0)])
            .await
            .unwrap();

        let src = applier.registry().get_token(SRC, 1).await.unwrap().unwrap();
        assert_eq!(src.symbol.as_deref(), Some("USDC"));
        // chain 8453 has no endpoint here
        let dst = applier.registry().get_token(DST, 8453).await.unwrap().unwrap();
        assert_eq!(dst.symbol, None);
        assert!(applier.registry().get_mapping(key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn add_remove_add_ends_active() {
        let applier = applier(ChainSet::new());
        let logs = vec![
            indexed_log(MappingEventKind::Added, 8453, DST, SRC, 10, 0),
            indexed_log(MappingEventKind::Removed, 8453, DST, SRC, 11, 0),
            indexed_log(MappingEventKind::Added, 8453, DST, SRC, 12, 4),
        ];

        applier.apply_logs(1, &logs).await.unwrap();

        let mapping = applier.registry().get_mapping(key()).await.unwrap().unwrap();
        assert!(mapping.is_active);
        assert_eq!(mapping.block_number, 12);
        assert_eq!(mapping.tx_hash, logs[2].transaction_hash);
    }
}
