use crate::repository::{DEFAULT_DECIMALS, Token, UNKNOWN_NAME, UNKNOWN_SYMBOL};
use crate::source::ChainSet;
use alloy_primitives::Address;
use tracing::{debug, warn};

/// Best-effort ERC20 metadata lookup across every configured chain.
pub struct TokenMetadataResolver {
    chains: ChainSet,
}

impl TokenMetadataResolver {
    pub fn new(chains: ChainSet) -> Self {
        Self { chains }
    }

    /// Returns `None` only when `chain_id` has no configured endpoint. Each
    /// field degrades to a placeholder on its own when its call fails.
    pub async fn resolve(&self, address: Address, chain_id: u64) -> Option<Token> {
        let Some(reader) = self.chains.token_reader(chain_id) else {
            debug!("No endpoint for chain {}, skipping metadata of {:?}", chain_id, address);
            return None;
        };

        let (symbol, name, decimals) = tokio::join!(
            reader.read_symbol(address),
            reader.read_name(address),
            reader.read_decimals(address),
        );

        let symbol = symbol.unwrap_or_else(|e| {
            warn!("symbol() failed for {:?} on chain {}: {}", address, chain_id, e);
            UNKNOWN_SYMBOL.to_string()
        });
        let name = name.unwrap_or_else(|e| {
            warn!("name() failed for {:?} on chain {}: {}", address, chain_id, e);
            UNKNOWN_NAME.to_string()
        });
        let decimals = decimals.unwrap_or_else(|e| {
            warn!("decimals() failed for {:?} on chain {}: {}", address, chain_id, e);
            DEFAULT_DECIMALS
        });

        Some(Token {
            address,
            chain_id,
            symbol: Some(symbol),
            name: Some(name),
            decimals: Some(decimals),
        })
    }
}
