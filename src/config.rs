use alloy_primitives::Address;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:./token_routes.db";
const DEFAULT_CHUNK_SIZE: u64 = 10_000;
const DEFAULT_REQUEST_DELAY_MS: u64 = 200;
const DEFAULT_RPC_MAX_RETRIES: usize = 3;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LIVE_POLL_INTERVAL_MS: u64 = 4_000;

/// Chains the router is deployed on: (chain id, display name, env prefix).
const KNOWN_NETWORKS: &[(u64, &str, &str)] = &[
    (42161, "Arbitrum", "ARBITRUM"),
    (5042002, "Arc Testnet", "ARC_TESTNET"),
    (43113, "Avalanche Fuji", "AVALANCHE_FUJI"),
    (43114, "Avalanche", "AVALANCHE"),
    (8453, "Base", "BASE"),
    (84532, "Base Sepolia", "BASE_SEPOLIA"),
    (56, "Binance", "BINANCE"),
    (1, "Ethereum", "ETHEREUM"),
    (314, "Filecoin", "FILECOIN"),
    (314159, "Filecoin Calibration", "FILECOIN_CALIBRATION"),
    (59144, "Linea", "LINEA"),
    (10, "Optimism", "OP"),
    (534352, "Scroll", "SCROLL"),
];

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub router_address: Address,
    /// `None` starts from the chain head, `Some(0)` disables historical sync.
    pub start_block: Option<u64>,
}

impl NetworkConfig {
    /// Watermark seeded into the registry for this chain. A static start
    /// block `S` means everything before `S` counts as processed.
    pub fn initial_watermark(&self) -> u64 {
        self.start_block.unwrap_or(0).saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub networks: Vec<NetworkConfig>,
    pub database_url: String,
    pub chunk_size: u64,
    pub request_delay: Duration,
    pub rpc_max_retries: usize,
    pub rpc_timeout: Duration,
    pub live_poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct FileNetwork {
    chain_id: u64,
    name: String,
    rpc_urls: Vec<String>,
    router_address: String,
    #[serde(default)]
    start_block: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let chunk_size = parse_or(&lookup, "BLOCK_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 {
            bail!("BLOCK_CHUNK_SIZE must be greater than zero");
        }

        let request_delay =
            Duration::from_millis(parse_or(&lookup, "REQUEST_DELAY_MS", DEFAULT_REQUEST_DELAY_MS)?);
        let rpc_max_retries = parse_or(&lookup, "RPC_MAX_RETRIES", DEFAULT_RPC_MAX_RETRIES)?;
        let rpc_timeout =
            Duration::from_secs(parse_or(&lookup, "RPC_TIMEOUT_SECS", DEFAULT_RPC_TIMEOUT_SECS)?);
        let live_poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "LIVE_POLL_INTERVAL_MS",
            DEFAULT_LIVE_POLL_INTERVAL_MS,
        )?);

        let networks = match lookup("NETWORKS_FILE") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read NETWORKS_FILE {path}"))?;
                parse_networks_json(&raw)
                    .with_context(|| format!("Invalid networks file {path}"))?
            }
            None => networks_from_lookup(&lookup)?,
        };

        let mut seen = HashSet::new();
        for network in &networks {
            if !seen.insert(network.chain_id) {
                bail!("Chain id {} is configured more than once", network.chain_id);
            }
        }

        Ok(Config {
            networks,
            database_url,
            chunk_size,
            request_delay,
            rpc_max_retries,
            rpc_timeout,
            live_poll_interval,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn networks_from_lookup<F>(lookup: &F) -> Result<Vec<NetworkConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut networks = Vec::new();

    for (chain_id, name, prefix) in KNOWN_NETWORKS {
        let rpc_urls = lookup(&format!("{prefix}_RPC_URL"))
            .map(|raw| split_urls(&raw))
            .unwrap_or_default();
        let router = lookup(&format!("{prefix}_ROUTER")).filter(|r| !r.trim().is_empty());

        let Some(router) = router.filter(|_| !rpc_urls.is_empty()) else {
            tracing::debug!("Skipping {name}: {prefix}_RPC_URL or {prefix}_ROUTER not set");
            continue;
        };

        let router_address = Address::from_str(router.trim())
            .with_context(|| format!("Invalid {prefix}_ROUTER format"))?;

        let start_key = format!("{prefix}_START_BLOCK");
        let start_block = lookup(&start_key)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid value for {start_key}: {raw}"))
            })
            .transpose()?;

        networks.push(NetworkConfig {
            chain_id: *chain_id,
            name: name.to_string(),
            rpc_urls,
            router_address,
            start_block,
        });
    }

    Ok(networks)
}

fn parse_networks_json(raw: &str) -> Result<Vec<NetworkConfig>> {
    let entries: Vec<FileNetwork> = serde_json::from_str(raw)?;

    entries
        .into_iter()
        .map(|entry| {
            if entry.rpc_urls.is_empty() {
                bail!("Network {} has no rpc_urls", entry.chain_id);
            }
            let router_address = Address::from_str(&entry.router_address)
                .with_context(|| format!("Invalid router_address for chain {}", entry.chain_id))?;
            Ok(NetworkConfig {
                chain_id: entry.chain_id,
                name: entry.name,
                rpc_urls: entry.rpc_urls,
                router_address,
                start_block: entry.start_block,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ROUTER: &str = "0x3dD1a497846d060D0e7Cf3cd2B5F3cE0e3F42E9c";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.networks.is_empty());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.request_delay, Duration::from_millis(200));
    }

    #[test]
    fn network_requires_rpc_and_router() {
        let config = Config::from_lookup(lookup_from(&[
            ("BASE_RPC_URL", "https://base.example, https://base-backup.example"),
            ("BASE_ROUTER", ROUTER),
            ("BASE_START_BLOCK", "1200"),
            ("SCROLL_RPC_URL", "https://scroll.example"),
        ]))
        .unwrap();

        assert_eq!(config.networks.len(), 1);
        let base = &config.networks[0];
        assert_eq!(base.chain_id, 8453);
        assert_eq!(base.name, "Base");
        assert_eq!(base.rpc_urls.len(), 2);
        assert_eq!(base.start_block, Some(1200));
        assert_eq!(base.initial_watermark(), 1199);
    }

    #[test]
    fn unset_and_zero_start_block_are_distinct() {
        let config = Config::from_lookup(lookup_from(&[
            ("ETHEREUM_RPC_URL", "https://eth.example"),
            ("ETHEREUM_ROUTER", ROUTER),
            ("OP_RPC_URL", "https://op.example"),
            ("OP_ROUTER", ROUTER),
            ("OP_START_BLOCK", "0"),
        ]))
        .unwrap();

        let eth = config.networks.iter().find(|n| n.chain_id == 1).unwrap();
        let op = config.networks.iter().find(|n| n.chain_id == 10).unwrap();
        assert_eq!(eth.start_block, None);
        assert_eq!(op.start_block, Some(0));
        assert_eq!(op.initial_watermark(), 0);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Config::from_lookup(lookup_from(&[("BLOCK_CHUNK_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("REQUEST_DELAY_MS", "soon")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[
                ("LINEA_RPC_URL", "https://linea.example"),
                ("LINEA_ROUTER", "not-an-address"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn parses_networks_file_contents() {
        let raw = format!(
            r#"[
                {{"chain_id": 84532, "name": "Base Sepolia", "rpc_urls": ["https://a"], "router_address": "{ROUTER}", "start_block": 5}},
                {{"chain_id": 43113, "name": "Avalanche Fuji", "rpc_urls": ["https://b"], "router_address": "{ROUTER}"}}
            ]"#
        );
        let networks = parse_networks_json(&raw).unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].start_block, Some(5));
        assert_eq!(networks[1].start_block, None);
    }
}
