use super::models::{Mapping, MappingFilter, MappingKey, MappingView, address_key};
use super::token_repository::{optional_token_from_row, parse_address};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};
use std::str::FromStr;

pub struct MappingRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> MappingRepository<'a> {
    const UPSERT_MAPPING: &'static str = "INSERT INTO mappings (
            src_token_address, src_chain_id, dst_token_address, dst_chain_id,
            is_active, block_number, tx_hash, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(src_token_address, src_chain_id, dst_token_address, dst_chain_id)
        DO UPDATE SET
            is_active = excluded.is_active,
            block_number = excluded.block_number,
            tx_hash = excluded.tx_hash,
            timestamp = excluded.timestamp";

    const DEACTIVATE_MAPPING: &'static str = "UPDATE mappings
        SET is_active = 0, block_number = ?1, tx_hash = ?2, timestamp = ?3
        WHERE src_token_address = ?4 AND src_chain_id = ?5
          AND dst_token_address = ?6 AND dst_chain_id = ?7";

    const SELECT_MAPPING: &'static str = "SELECT src_token_address, src_chain_id,
        dst_token_address, dst_chain_id, is_active, block_number, tx_hash, timestamp
        FROM mappings";

    const SELECT_MAPPING_VIEW: &'static str = "SELECT
            m.src_token_address, m.src_chain_id, m.dst_token_address, m.dst_chain_id,
            m.is_active, m.block_number, m.tx_hash, m.timestamp,
            st.address, st.chain_id, st.symbol, st.name, st.decimals,
            dt.address, dt.chain_id, dt.symbol, dt.name, dt.decimals,
            sn.name, dn.name
        FROM mappings m
        LEFT JOIN tokens st ON st.address = m.src_token_address AND st.chain_id = m.src_chain_id
        LEFT JOIN tokens dt ON dt.address = m.dst_token_address AND dt.chain_id = m.dst_chain_id
        LEFT JOIN networks sn ON sn.chain_id = m.src_chain_id
        LEFT JOIN networks dn ON dn.chain_id = m.dst_chain_id";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, mapping: &Mapping) -> Result<()> {
        let key = &mapping.key;
        self.conn.execute(
            Self::UPSERT_MAPPING,
            params![
                address_key(&key.src_token),
                key.src_chain_id,
                address_key(&key.dst_token),
                key.dst_chain_id,
                mapping.is_active,
                mapping.block_number,
                format!("{:?}", mapping.tx_hash),
                mapping.timestamp,
            ],
        )?;
        Ok(())
    }

    /// Marks an existing mapping inactive. Returns `false` when the key has
    /// never been stored.
    pub fn deactivate(
        &self,
        key: &MappingKey,
        block_number: u64,
        tx_hash: &B256,
        timestamp: u64,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            Self::DEACTIVATE_MAPPING,
            params![
                block_number,
                format!("{tx_hash:?}"),
                timestamp,
                address_key(&key.src_token),
                key.src_chain_id,
                address_key(&key.dst_token),
                key.dst_chain_id,
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn get(&self, key: &MappingKey) -> Result<Option<Mapping>> {
        let sql = format!(
            "{} WHERE src_token_address = ?1 AND src_chain_id = ?2
               AND dst_token_address = ?3 AND dst_chain_id = ?4",
            Self::SELECT_MAPPING
        );
        let mapping = self
            .conn
            .query_row(
                &sql,
                params![
                    address_key(&key.src_token),
                    key.src_chain_id,
                    address_key(&key.dst_token),
                    key.dst_chain_id,
                ],
                |row| mapping_from_row(row),
            )
            .optional()?;
        Ok(mapping)
    }

    /// Active mappings matching every supplied filter field.
    pub fn query_active(&self, filter: &MappingFilter) -> Result<Vec<Mapping>> {
        let (conditions, params) = Self::filter_conditions("", filter);
        let sql = format!(
            "{} WHERE {} ORDER BY src_chain_id, dst_chain_id, block_number",
            Self::SELECT_MAPPING,
            conditions.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mappings = stmt
            .query_map(params_from_iter(params.iter()), mapping_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(mappings)
    }

    pub fn query_active_views(&self, filter: &MappingFilter) -> Result<Vec<MappingView>> {
        let (conditions, params) = Self::filter_conditions("m.", filter);
        self.execute_view_query(conditions, params)
    }

    /// Active mappings leaving `src_token` on `src_chain_id`.
    pub fn views_by_source_token(
        &self,
        src_token: &Address,
        src_chain_id: u64,
    ) -> Result<Vec<MappingView>> {
        let conditions = vec![
            "m.is_active = 1".to_string(),
            "m.src_token_address = ?".to_string(),
            "m.src_chain_id = ?".to_string(),
        ];
        let params: Vec<Box<dyn ToSql>> =
            vec![Box::new(address_key(src_token)), Box::new(src_chain_id)];
        self.execute_view_query(conditions, params)
    }

    pub fn count(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM mappings", [], |row| row.get(0))?;
        Ok(count)
    }

    fn filter_conditions(
        prefix: &str,
        filter: &MappingFilter,
    ) -> (Vec<String>, Vec<Box<dyn ToSql>>) {
        let mut conditions = vec![format!("{prefix}is_active = 1")];
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(src) = filter.src_chain_id {
            conditions.push(format!("{prefix}src_chain_id = ?"));
            params.push(Box::new(src));
        }

        if let Some(dst) = filter.dst_chain_id {
            conditions.push(format!("{prefix}dst_chain_id = ?"));
            params.push(Box::new(dst));
        }

        (conditions, params)
    }

    fn execute_view_query(
        &self,
        conditions: Vec<String>,
        params: Vec<Box<dyn ToSql>>,
    ) -> Result<Vec<MappingView>> {
        let sql = format!(
            "{} WHERE {} ORDER BY m.src_chain_id, m.dst_chain_id, m.block_number",
            Self::SELECT_MAPPING_VIEW,
            conditions.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let views = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(MappingView {
                    mapping: mapping_from_row(row)?,
                    src_token: optional_token_from_row(row, 8)?,
                    dst_token: optional_token_from_row(row, 13)?,
                    src_network: row.get(18)?,
                    dst_network: row.get(19)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }
}

fn mapping_from_row(row: &Row) -> rusqlite::Result<Mapping> {
    let tx_hash: String = row.get(6)?;
    Ok(Mapping {
        key: MappingKey {
            src_token: parse_address(row, 0)?,
            src_chain_id: row.get(1)?,
            dst_token: parse_address(row, 2)?,
            dst_chain_id: row.get(3)?,
        },
        is_active: row.get(4)?,
        block_number: row.get(5)?,
        tx_hash: B256::from_str(&tx_hash).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        timestamp: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Database, Network, NetworkRepository, Token, TokenRepository};
    use alloy_primitives::address;

    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const USDC_BASE: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    const USDC_OP: Address = address!("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85");

    fn mapping(src_chain_id: u64, src: Address, dst_chain_id: u64, dst: Address, active: bool) -> Mapping {
        Mapping {
            key: MappingKey {
                src_token: src,
                src_chain_id,
                dst_token: dst,
                dst_chain_id,
            },
            is_active: active,
            block_number: 100,
            tx_hash: B256::repeat_byte(0x42),
            timestamp: 1_700_000_000_000,
        }
    }

    fn seed(conn: &rusqlite::Connection) {
        let networks = NetworkRepository::new(conn);
        for (chain_id, name) in [(1, "Ethereum"), (8453, "Base")] {
            networks
                .upsert(&Network {
                    chain_id,
                    name: name.to_string(),
                    router_address: Address::ZERO,
                    last_synced_block: 0,
                })
                .unwrap();
        }
        TokenRepository::new(conn)
            .upsert(&Token {
                address: USDC,
                chain_id: 1,
                symbol: Some("USDC".into()),
                name: Some("USD Coin".into()),
                decimals: Some(6),
            })
            .unwrap();

        let mappings = MappingRepository::new(conn);
        mappings.upsert(&mapping(1, USDC, 8453, USDC_BASE, true)).unwrap();
        mappings.upsert(&mapping(1, USDC, 10, USDC_OP, false)).unwrap();
        mappings.upsert(&mapping(10, USDC_OP, 1, USDC, true)).unwrap();
    }

    #[test]
    fn views_join_tokens_and_network_names() {
        let db = Database::new(":memory:").unwrap();
        let conn = db.lock().unwrap();
        seed(&conn);

        let views = MappingRepository::new(&conn)
            .query_active_views(&MappingFilter::default())
            .unwrap();

        assert_eq!(views.len(), 2);
        let to_base = &views[0];
        assert_eq!(to_base.mapping.key.dst_chain_id, 8453);
        assert_eq!(
            to_base.src_token.as_ref().and_then(|t| t.symbol.as_deref()),
            Some("USDC")
        );
        assert!(to_base.dst_token.is_none());
        assert_eq!(to_base.src_network.as_deref(), Some("Ethereum"));
        assert_eq!(to_base.dst_network.as_deref(), Some("Base"));

        let from_op = &views[1];
        assert_eq!(from_op.mapping.key.src_chain_id, 10);
        assert!(from_op.src_token.is_none());
        assert!(from_op.src_network.is_none());
        assert_eq!(from_op.dst_network.as_deref(), Some("Ethereum"));
        assert_eq!(from_op.dst_token.as_ref().map(|t| t.address), Some(USDC));
    }

    #[test]
    fn views_return_only_active_rows() {
        let db = Database::new(":memory:").unwrap();
        let conn = db.lock().unwrap();
        seed(&conn);
        let repo = MappingRepository::new(&conn);

        let by_dst = repo
            .query_active_views(&MappingFilter {
                src_chain_id: Some(1),
                dst_chain_id: Some(10),
            })
            .unwrap();
        assert!(by_dst.is_empty());

        let outgoing = repo.views_by_source_token(&USDC, 1).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].mapping.key.dst_token, USDC_BASE);
        assert!(outgoing[0].mapping.is_active);

        assert_eq!(repo.count().unwrap(), 3);
    }
}
