use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, Bytes, U256};
use thiserror::Error;

sol! {
    event TokenMappingAdded(uint256 indexed dstChainId, address indexed dstToken, address indexed srcToken);
    event TokenMappingRemoved(uint256 indexed dstChainId, address indexed dstToken, address indexed srcToken);

    function symbol() external view returns (string);
    function name() external view returns (string);
    function decimals() external view returns (uint8);
}

const WORD: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,
    #[error("unknown event signature {0}")]
    UnknownSignature(B256),
    #[error("expected 4 topics for indexed encoding, got {0}")]
    MissingTopics(usize),
    #[error("data payload too short: {0} bytes, need {min}", min = 3 * WORD)]
    ShortPayload(usize),
    #[error("destination chain id {0} does not fit in 64 bits")]
    ChainIdOverflow(U256),
    #[error("log is missing its {0}")]
    MissingField(&'static str),
}

/// A log record as delivered by a chain endpoint, stripped to what decoding
/// needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl TryFrom<Log> for RawLog {
    type Error = DecodeError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let block_number = log.block_number.ok_or(DecodeError::MissingField("block number"))?;
        let transaction_hash = log
            .transaction_hash
            .ok_or(DecodeError::MissingField("transaction hash"))?;
        Ok(RawLog {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number,
            log_index: log.log_index.unwrap_or_default(),
            transaction_hash,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingEventKind {
    Added,
    Removed,
}

impl MappingEventKind {
    pub fn signature(self) -> B256 {
        match self {
            MappingEventKind::Added => TokenMappingAdded::SIGNATURE_HASH,
            MappingEventKind::Removed => TokenMappingRemoved::SIGNATURE_HASH,
        }
    }

    pub fn from_signature(topic0: &B256) -> Option<Self> {
        if *topic0 == TokenMappingAdded::SIGNATURE_HASH {
            Some(MappingEventKind::Added)
        } else if *topic0 == TokenMappingRemoved::SIGNATURE_HASH {
            Some(MappingEventKind::Removed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEvent {
    pub kind: MappingEventKind,
    pub dst_chain_id: u64,
    pub dst_token: Address,
    pub src_token: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

/// How the three event arguments were laid out by the emitting contract.
/// Router deployments differ: older ones index all three arguments, newer
/// ones pack them into the data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEncoding {
    Indexed,
    Packed,
}

impl EventEncoding {
    pub fn of(log: &RawLog) -> Self {
        if log.data.is_empty() {
            EventEncoding::Indexed
        } else {
            EventEncoding::Packed
        }
    }

    fn decode_args(self, log: &RawLog) -> Result<(U256, Address, Address), DecodeError> {
        match self {
            EventEncoding::Indexed => {
                if log.topics.len() < 4 {
                    return Err(DecodeError::MissingTopics(log.topics.len()));
                }
                Ok((
                    U256::from_be_slice(log.topics[1].as_slice()),
                    word_to_address(log.topics[2].as_slice()),
                    word_to_address(log.topics[3].as_slice()),
                ))
            }
            EventEncoding::Packed => {
                let data = log.data.as_ref();
                if data.len() < 3 * WORD {
                    return Err(DecodeError::ShortPayload(data.len()));
                }
                Ok((
                    U256::from_be_slice(&data[..WORD]),
                    word_to_address(&data[WORD..2 * WORD]),
                    word_to_address(&data[2 * WORD..3 * WORD]),
                ))
            }
        }
    }
}

fn word_to_address(word: &[u8]) -> Address {
    Address::from_slice(&word[WORD - 20..WORD])
}

pub fn decode_mapping_event(log: &RawLog) -> Result<MappingEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::NoTopics)?;
    let kind =
        MappingEventKind::from_signature(topic0).ok_or(DecodeError::UnknownSignature(*topic0))?;

    let (dst_chain_id, dst_token, src_token) = EventEncoding::of(log).decode_args(log)?;
    let dst_chain_id =
        u64::try_from(dst_chain_id).map_err(|_| DecodeError::ChainIdOverflow(dst_chain_id))?;

    Ok(MappingEvent {
        kind,
        dst_chain_id,
        dst_token,
        src_token,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: log.transaction_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{indexed_log, packed_log};
    use alloy_primitives::address;

    const SRC: Address = address!("0x1111111111111111111111111111111111111111");
    const DST: Address = address!("0x2222222222222222222222222222222222222222");

    #[test]
    fn decodes_indexed_topics_when_data_is_empty() {
        let log = indexed_log(MappingEventKind::Added, 137, DST, SRC, 500, 2);
        assert_eq!(EventEncoding::of(&log), EventEncoding::Indexed);

        let event = decode_mapping_event(&log).unwrap();
        assert_eq!(event.kind, MappingEventKind::Added);
        assert_eq!(event.dst_chain_id, 137);
        assert_eq!(event.dst_token, DST);
        assert_eq!(event.src_token, SRC);
        assert_eq!(event.block_number, 500);
        assert_eq!(event.log_index, 2);
    }

    #[test]
    fn decodes_packed_payload_when_data_is_present() {
        let log = packed_log(MappingEventKind::Removed, 8453, DST, SRC, 42, 0);
        assert_eq!(EventEncoding::of(&log), EventEncoding::Packed);

        let event = decode_mapping_event(&log).unwrap();
        assert_eq!(event.kind, MappingEventKind::Removed);
        assert_eq!(event.dst_chain_id, 8453);
        assert_eq!(event.dst_token, DST);
        assert_eq!(event.src_token, SRC);
    }

    #[test]
    fn rejects_indexed_log_with_three_topics() {
        let mut log = indexed_log(MappingEventKind::Added, 1, DST, SRC, 10, 0);
        log.topics.pop();
        assert_eq!(decode_mapping_event(&log), Err(DecodeError::MissingTopics(3)));
    }

    #[test]
    fn rejects_short_payload() {
        let mut log = packed_log(MappingEventKind::Added, 1, DST, SRC, 10, 0);
        log.data = Bytes::from(vec![0u8; 64]);
        assert_eq!(decode_mapping_event(&log), Err(DecodeError::ShortPayload(64)));
    }

    #[test]
    fn rejects_unknown_signature_and_oversized_chain_id() {
        let mut log = indexed_log(MappingEventKind::Added, 1, DST, SRC, 10, 0);
        log.topics[0] = B256::repeat_byte(0xab);
        assert!(matches!(
            decode_mapping_event(&log),
            Err(DecodeError::UnknownSignature(_))
        ));

        let mut log = indexed_log(MappingEventKind::Added, 1, DST, SRC, 10, 0);
        log.topics[1] = B256::repeat_byte(0xff);
        assert!(matches!(
            decode_mapping_event(&log),
            Err(DecodeError::ChainIdOverflow(_))
        ));
    }

    #[test]
    fn signature_matches_router_abi() {
        assert_eq!(
            TokenMappingAdded::SIGNATURE,
            "TokenMappingAdded(uint256,address,address)"
        );
        assert_eq!(
            MappingEventKind::from_signature(&TokenMappingRemoved::SIGNATURE_HASH),
            Some(MappingEventKind::Removed)
        );
    }
}
