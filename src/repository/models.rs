use alloy_primitives::{Address, B256};

pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";
pub const UNKNOWN_NAME: &str = "Unknown Token";
pub const DEFAULT_DECIMALS: u8 = 18;

/// Lowercase `0x` hex, the storage form of every address column.
pub fn address_key(address: &Address) -> String {
    format!("{address:?}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub router_address: Address,
    pub last_synced_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub address: Address,
    pub chain_id: u64,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
}

impl Token {
    pub fn bare(address: Address, chain_id: u64) -> Self {
        Token {
            address,
            chain_id,
            symbol: None,
            name: None,
            decimals: None,
        }
    }
}

/// Identity of a directed routing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub src_token: Address,
    pub src_chain_id: u64,
    pub dst_token: Address,
    pub dst_chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub key: MappingKey,
    pub is_active: bool,
    pub block_number: u64,
    pub tx_hash: B256,
    /// Unix milliseconds of the last write.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingFilter {
    pub src_chain_id: Option<u64>,
    pub dst_chain_id: Option<u64>,
}

/// A mapping joined with whatever token and network rows exist for its
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingView {
    pub mapping: Mapping,
    pub src_token: Option<Token>,
    pub dst_token: Option<Token>,
    pub src_network: Option<String>,
    pub dst_network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenView {
    pub token: Token,
    pub network_name: Option<String>,
}
