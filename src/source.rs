use crate::events::RawLog;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

pub type LogStream = BoxStream<'static, RawLog>;

/// Log access for a single chain.
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    async fn current_block_number(&self) -> Result<u64>;

    /// Logs emitted by `address` whose first topic is `topic0`, in the
    /// inclusive range `[from_block, to_block]`.
    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>>;

    /// Logs emitted by `address` matching any of `topics0`, from now on.
    async fn subscribe(&self, address: Address, topics0: Vec<B256>) -> Result<LogStream>;
}

/// ERC20 metadata reads against a token contract. Every call fails
/// independently.
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn read_symbol(&self, token: Address) -> Result<String>;
    async fn read_name(&self, token: Address) -> Result<String>;
    async fn read_decimals(&self, token: Address) -> Result<u8>;
}

/// The connected endpoints of every configured chain, keyed by chain id.
#[derive(Clone, Default)]
pub struct ChainSet {
    logs: HashMap<u64, Arc<dyn ChainLogSource>>,
    tokens: HashMap<u64, Arc<dyn TokenReader>>,
}

impl ChainSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<C>(&mut self, chain_id: u64, client: Arc<C>)
    where
        C: ChainLogSource + TokenReader + 'static,
    {
        self.logs.insert(chain_id, client.clone());
        self.tokens.insert(chain_id, client);
    }

    pub fn insert_parts(
        &mut self,
        chain_id: u64,
        logs: Arc<dyn ChainLogSource>,
        tokens: Arc<dyn TokenReader>,
    ) {
        self.logs.insert(chain_id, logs);
        self.tokens.insert(chain_id, tokens);
    }

    pub fn log_source(&self, chain_id: u64) -> Option<Arc<dyn ChainLogSource>> {
        self.logs.get(&chain_id).cloned()
    }

    pub fn token_reader(&self, chain_id: u64) -> Option<Arc<dyn TokenReader>> {
        self.tokens.get(&chain_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
