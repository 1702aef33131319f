use crate::events::{RawLog, decimalsCall, nameCall, symbolCall};
use crate::source::{ChainLogSource, LogStream, TokenReader};
use alloy::network::TransactionBuilder;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub max_retries: usize,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

/// JSON-RPC access to one chain, rotating across its configured endpoints.
#[derive(Clone)]
pub struct RpcClient {
    chain_id: u64,
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    settings: RpcSettings,
}

impl RpcClient {
    pub fn new(chain_id: u64, rpc_urls: &[String], settings: RpcSettings) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one RPC URL must be provided for chain {}",
                chain_id
            ));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            chain_id,
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            settings,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Chain {}: rotating to RPC provider #{}", self.chain_id, next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.settings.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "Chain {}: RPC error on {}: {}, rotating provider",
            self.chain_id, current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        let secs = self.settings.request_timeout.as_secs();
        warn!(
            "Chain {}: request timeout after {} seconds on {}, rotating provider",
            self.chain_id, secs, current_url
        );
        self.rotate_provider();
        anyhow::anyhow!("Request timeout after {} seconds", secs)
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(client.settings.request_timeout, provider.get_block_number()).await {
                    Ok(Ok(block_number)) => Ok(block_number),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    /// Read-only contract call. Not retried: a revert is an answer, not a
    /// transport fault.
    pub async fn call_contract<C: SolCall>(&self, address: Address, call: C) -> Result<C::Return> {
        let request = TransactionRequest::default()
            .with_to(address)
            .with_input(call.abi_encode());

        let output = match timeout(self.settings.request_timeout, self.get_provider().call(request)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(self.handle_timeout()),
        };

        Ok(C::abi_decode_returns(&output)?)
    }

    async fn get_logs_internal(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let filter = Filter::new()
                    .address(contract_address)
                    .event_signature(topic0)
                    .from_block(from_block)
                    .to_block(to_block);

                match timeout(client.settings.request_timeout, provider.get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();

                        if error_str.contains("exceeds max results") {
                            debug!(
                                "Max results exceeded for blocks {}-{}, will split range",
                                from_block, to_block
                            );
                            // surfaced as a value so the retry loop does not repeat it
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    /// Fetches every matching log in `[from_block, to_block]`, following
    /// the endpoint's suggested sub-ranges when a response is too large.
    pub async fn fetch_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self
                .get_logs_internal(current_from, to_block, contract_address, topic0)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();
                    let suggested = error_str
                        .contains("exceeds max results")
                        .then(|| Self::parse_max_results_error(&error_str))
                        .flatten()
                        .filter(|(_, to)| *to >= current_from && *to < to_block);

                    let Some((_, suggested_to)) = suggested else {
                        return Err(e);
                    };

                    info!(
                        "Chain {}: hit max results limit for blocks {}-{}, splitting at block {}",
                        self.chain_id, current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(current_from, suggested_to, contract_address, topic0)
                        .await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }

    fn convert_logs(&self, logs: Vec<Log>) -> Vec<RawLog> {
        logs.into_iter()
            .filter_map(|log| match RawLog::try_from(log) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!("Chain {}: dropping log: {}", self.chain_id, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl ChainLogSource for RpcClient {
    async fn current_block_number(&self) -> Result<u64> {
        self.get_latest_block().await
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        let logs = self.fetch_logs(from_block, to_block, address, topic0).await?;
        Ok(self.convert_logs(logs))
    }

    async fn subscribe(&self, address: Address, topics0: Vec<B256>) -> Result<LogStream> {
        let filter = Filter::new().address(address).event_signature(topics0);
        let poller = self.get_provider().watch_logs(&filter).await?;
        let chain_id = self.chain_id;

        let stream = poller
            .with_poll_interval(self.settings.poll_interval)
            .into_stream()
            .flat_map(futures::stream::iter)
            .filter_map(move |log| async move {
                match RawLog::try_from(log) {
                    Ok(raw) => Some(raw),
                    Err(e) => {
                        warn!("Chain {}: dropping live log: {}", chain_id, e);
                        None
                    }
                }
            });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl TokenReader for RpcClient {
    async fn read_symbol(&self, token: Address) -> Result<String> {
        self.call_contract(token, symbolCall {}).await
    }

    async fn read_name(&self, token: Address) -> Result<String> {
        self.call_contract(token, nameCall {}).await
    }

    async fn read_decimals(&self, token: Address) -> Result<u8> {
        self.call_contract(token, decimalsCall {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggested_range_from_provider_error() {
        let message = "query exceeds max results 10000, retry with the range 100-5099";
        assert_eq!(
            RpcClient::parse_max_results_error(message),
            Some((100, 5099))
        );
        assert_eq!(RpcClient::parse_max_results_error("rate limited"), None);
    }

    #[test]
    fn requires_at_least_one_url() {
        let settings = RpcSettings {
            max_retries: 0,
            request_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
        };
        assert!(RpcClient::new(1, &[], settings.clone()).is_err());
        assert!(RpcClient::new(1, &["not a url".to_string()], settings).is_err());
    }
}
