//! In-memory stand-ins for chain endpoints.

use crate::events::{MappingEventKind, RawLog};
use crate::source::{ChainLogSource, LogStream, TokenReader};
use alloy_primitives::{Address, B256, Bytes, U256, address};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub const ROUTER: Address = address!("0x16323707e61d20A39AaE5ab64808e480B91658aB");

fn word(value: u64) -> B256 {
    B256::from(U256::from(value).to_be_bytes::<32>())
}

fn tx_hash(block_number: u64, log_index: u64) -> B256 {
    word(block_number * 1_000 + log_index)
}

pub fn indexed_log(
    kind: MappingEventKind,
    dst_chain_id: u64,
    dst_token: Address,
    src_token: Address,
    block_number: u64,
    log_index: u64,
) -> RawLog {
    RawLog {
        address: ROUTER,
        topics: vec![
            kind.signature(),
            word(dst_chain_id),
            dst_token.into_word(),
            src_token.into_word(),
        ],
        data: Bytes::new(),
        block_number,
        log_index,
        transaction_hash: tx_hash(block_number, log_index),
    }
}

pub fn packed_log(
    kind: MappingEventKind,
    dst_chain_id: u64,
    dst_token: Address,
    src_token: Address,
    block_number: u64,
    log_index: u64,
) -> RawLog {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(word(dst_chain_id).as_slice());
    data.extend_from_slice(dst_token.into_word().as_slice());
    data.extend_from_slice(src_token.into_word().as_slice());

    RawLog {
        address: ROUTER,
        topics: vec![kind.signature()],
        data: Bytes::from(data),
        block_number,
        log_index,
        transaction_hash: tx_hash(block_number, log_index),
    }
}

#[derive(Default)]
pub struct MockLogSource {
    head: AtomicU64,
    head_step: u64,
    logs: Vec<RawLog>,
    live: Mutex<Option<Vec<RawLog>>>,
    fail_logs_from: Option<u64>,
    fail_subscribe: bool,
    fail_head: bool,
    requests: Mutex<Vec<(B256, u64, u64)>>,
}

impl MockLogSource {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            live: Mutex::new(Some(Vec::new())),
            ..Default::default()
        }
    }

    pub fn with_logs(mut self, logs: Vec<RawLog>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_live(self, logs: Vec<RawLog>) -> Self {
        *self.live.lock().unwrap() = Some(logs);
        self
    }

    /// Any `get_logs` reaching `block` or beyond fails.
    pub fn failing_logs_from(mut self, block: u64) -> Self {
        self.fail_logs_from = Some(block);
        self
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Each head read returns a block `step` past the previous one.
    pub fn advancing_head(mut self, step: u64) -> Self {
        self.head_step = step;
        self
    }

    pub fn failing_head(mut self) -> Self {
        self.fail_head = true;
        self
    }

    /// Block ranges requested for `topic0`, in request order.
    pub fn ranges_for(&self, topic0: B256) -> Vec<(u64, u64)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _, _)| *topic == topic0)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }
}

#[async_trait]
impl ChainLogSource for MockLogSource {
    async fn current_block_number(&self) -> Result<u64> {
        if self.fail_head {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.head.fetch_add(self.head_step, Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        self.requests
            .lock()
            .unwrap()
            .push((topic0, from_block, to_block));

        if self.fail_logs_from.is_some_and(|block| to_block >= block) {
            return Err(anyhow!("eth_getLogs: upstream unavailable"));
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.address == address
                    && log.topics.first() == Some(&topic0)
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn subscribe(&self, address: Address, topics0: Vec<B256>) -> Result<LogStream> {
        if self.fail_subscribe {
            return Err(anyhow!("eth_newFilter not supported"));
        }
        let logs: Vec<RawLog> = self
            .live
            .lock()
            .unwrap()
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter(|log| {
                log.address == address
                    && log.topics.first().is_some_and(|t| topics0.contains(t))
            })
            .collect();
        Ok(futures::stream::iter(logs).boxed())
    }
}

#[derive(Default)]
pub struct MockTokenReader {
    tokens: HashMap<Address, (String, String, u8)>,
    failing_decimals: HashSet<Address>,
}

impl MockTokenReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: Address, symbol: &str, name: &str, decimals: u8) -> Self {
        self.tokens
            .insert(token, (symbol.to_string(), name.to_string(), decimals));
        self
    }

    pub fn failing_decimals(mut self, token: Address) -> Self {
        self.failing_decimals.insert(token);
        self
    }

    fn lookup(&self, token: Address) -> Result<&(String, String, u8)> {
        self.tokens
            .get(&token)
            .ok_or_else(|| anyhow!("execution reverted"))
    }
}

#[async_trait]
impl TokenReader for MockTokenReader {
    async fn read_symbol(&self, token: Address) -> Result<String> {
        Ok(self.lookup(token)?.0.clone())
    }

    async fn read_name(&self, token: Address) -> Result<String> {
        Ok(self.lookup(token)?.1.clone())
    }

    async fn read_decimals(&self, token: Address) -> Result<u8> {
        if self.failing_decimals.contains(&token) {
            return Err(anyhow!("execution reverted"));
        }
        Ok(self.lookup(token)?.2)
    }
}
