use super::models::{Network, address_key};
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use std::str::FromStr;

pub struct NetworkRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> NetworkRepository<'a> {
    const UPSERT_NETWORK: &'static str =
        "INSERT INTO networks (chain_id, name, router_address, last_synced_block)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chain_id) DO UPDATE SET
            name = excluded.name,
            router_address = excluded.router_address,
            last_synced_block = MAX(networks.last_synced_block, excluded.last_synced_block)";

    const ADVANCE_WATERMARK: &'static str =
        "UPDATE networks SET last_synced_block = MAX(last_synced_block, ?1) WHERE chain_id = ?2";

    const SELECT_NETWORK: &'static str =
        "SELECT chain_id, name, router_address, last_synced_block FROM networks";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, network: &Network) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_NETWORK,
            params![
                network.chain_id,
                network.name,
                address_key(&network.router_address),
                network.last_synced_block,
            ],
        )?;
        Ok(())
    }

    /// Raises the watermark to `block_number` unless it is already higher.
    /// Returns whether the chain is known.
    pub fn advance_watermark(&self, chain_id: u64, block_number: u64) -> Result<bool> {
        let updated = self
            .conn
            .execute(Self::ADVANCE_WATERMARK, params![block_number, chain_id])?;
        Ok(updated > 0)
    }

    pub fn get(&self, chain_id: u64) -> Result<Option<Network>> {
        let sql = format!("{} WHERE chain_id = ?1", Self::SELECT_NETWORK);
        let network = self
            .conn
            .query_row(&sql, params![chain_id], Self::row_to_network)
            .optional()?;
        Ok(network)
    }

    pub fn get_watermark(&self, chain_id: u64) -> Result<Option<u64>> {
        Ok(self.get(chain_id)?.map(|n| n.last_synced_block))
    }

    pub fn list(&self) -> Result<Vec<Network>> {
        let sql = format!("{} ORDER BY chain_id", Self::SELECT_NETWORK);
        let mut stmt = self.conn.prepare(&sql)?;
        let networks = stmt
            .query_map([], Self::row_to_network)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(networks)
    }

    fn row_to_network(row: &Row) -> rusqlite::Result<Network> {
        let router: String = row.get(2)?;
        Ok(Network {
            chain_id: row.get(0)?,
            name: row.get(1)?,
            router_address: Address::from_str(&router).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?,
            last_synced_block: row.get(3)?,
        })
    }
}
