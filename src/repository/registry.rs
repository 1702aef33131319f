use super::database::Database;
use super::mapping_repository::MappingRepository;
use super::models::{Mapping, MappingFilter, MappingKey, Network, Token};
use super::network_repository::NetworkRepository;
use super::token_repository::TokenRepository;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};

/// Async front of the SQLite registry used by the sync pipeline. Each call
/// runs one statement on the blocking pool and is committed before it
/// returns.
#[derive(Clone)]
pub struct MappingRegistry {
    db: Database,
}

impl MappingRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock()?;
            op(&conn)
        })
        .await?
    }

    /// Writes the edge as active, or refreshes it when it already exists.
    pub async fn upsert_mapping(
        &self,
        key: MappingKey,
        block_number: u64,
        tx_hash: B256,
        active: bool,
    ) -> Result<()> {
        let mapping = Mapping {
            key,
            is_active: active,
            block_number,
            tx_hash,
            timestamp: now_millis(),
        };
        self.run(move |conn| MappingRepository::new(conn).upsert(&mapping))
            .await
    }

    /// Soft-deletes the edge. Returns `false` (and changes nothing) when the
    /// edge was never stored.
    pub async fn deactivate_mapping(
        &self,
        key: MappingKey,
        block_number: u64,
        tx_hash: B256,
    ) -> Result<bool> {
        let timestamp = now_millis();
        self.run(move |conn| {
            MappingRepository::new(conn).deactivate(&key, block_number, &tx_hash, timestamp)
        })
        .await
    }

    pub async fn upsert_token(&self, token: Token) -> Result<()> {
        self.run(move |conn| TokenRepository::new(conn).upsert(&token))
            .await
    }

    pub async fn query_mappings(&self, filter: MappingFilter) -> Result<Vec<Mapping>> {
        self.run(move |conn| MappingRepository::new(conn).query_active(&filter))
            .await
    }

    pub async fn get_mapping(&self, key: MappingKey) -> Result<Option<Mapping>> {
        self.run(move |conn| MappingRepository::new(conn).get(&key))
            .await
    }

    pub async fn get_token(&self, token: Address, chain_id: u64) -> Result<Option<Token>> {
        self.run(move |conn| TokenRepository::new(conn).get(&token, chain_id))
            .await
    }

    /// Inserts or refreshes a network. The stored watermark never moves
    /// backwards.
    pub async fn upsert_network(&self, network: Network) -> Result<()> {
        self.run(move |conn| NetworkRepository::new(conn).upsert(&network))
            .await
    }

    pub async fn get_network(&self, chain_id: u64) -> Result<Option<Network>> {
        self.run(move |conn| NetworkRepository::new(conn).get(chain_id))
            .await
    }

    pub async fn watermark(&self, chain_id: u64) -> Result<u64> {
        let watermark = self
            .run(move |conn| NetworkRepository::new(conn).get_watermark(chain_id))
            .await?;
        Ok(watermark.unwrap_or(0))
    }

    /// Raises the chain's watermark to `block_number`; lower values are
    /// ignored.
    pub async fn advance_watermark(&self, chain_id: u64, block_number: u64) -> Result<()> {
        let known = self
            .run(move |conn| NetworkRepository::new(conn).advance_watermark(chain_id, block_number))
            .await?;
        if !known {
            anyhow::bail!("Cannot checkpoint unknown chain {}", chain_id);
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
