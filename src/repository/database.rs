use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Shared handle to the SQLite registry. Every caller goes through the same
/// connection, so each statement is applied atomically with respect to
/// other writers and readers in this process.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {db_path}"))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        create_tables(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS networks (
            chain_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            router_address TEXT NOT NULL,
            last_synced_block INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // addresses are stored lowercased
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tokens (
            address TEXT NOT NULL,
            chain_id INTEGER NOT NULL,
            symbol TEXT,
            name TEXT,
            decimals INTEGER,
            PRIMARY KEY (address, chain_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mappings (
            src_token_address TEXT NOT NULL,
            src_chain_id INTEGER NOT NULL,
            dst_token_address TEXT NOT NULL,
            dst_chain_id INTEGER NOT NULL,
            is_active INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            tx_hash TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            PRIMARY KEY (src_token_address, src_chain_id, dst_token_address, dst_chain_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mappings_chains
         ON mappings(src_chain_id, dst_chain_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mappings_dst_chain
         ON mappings(dst_chain_id)",
        [],
    )?;

    Ok(())
}
