use super::models::{Token, TokenView, address_key};
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use std::str::FromStr;

pub struct TokenRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenRepository<'a> {
    // empty strings never overwrite stored metadata
    const UPSERT_TOKEN: &'static str =
        "INSERT INTO tokens (address, chain_id, symbol, name, decimals)
         VALUES (?1, ?2, NULLIF(?3, ''), NULLIF(?4, ''), ?5)
         ON CONFLICT(address, chain_id) DO UPDATE SET
            symbol = COALESCE(NULLIF(excluded.symbol, ''), tokens.symbol),
            name = COALESCE(NULLIF(excluded.name, ''), tokens.name),
            decimals = COALESCE(excluded.decimals, tokens.decimals)";

    const GET_TOKEN: &'static str =
        "SELECT address, chain_id, symbol, name, decimals FROM tokens
         WHERE address = ?1 AND chain_id = ?2";

    const GET_TOKEN_VIEW: &'static str =
        "SELECT t.address, t.chain_id, t.symbol, t.name, t.decimals, n.name
         FROM tokens t
         LEFT JOIN networks n ON n.chain_id = t.chain_id
         WHERE t.address = ?1 AND t.chain_id = ?2";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, token: &Token) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TOKEN,
            params![
                address_key(&token.address),
                token.chain_id,
                token.symbol,
                token.name,
                token.decimals,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, address: &Address, chain_id: u64) -> Result<Option<Token>> {
        let token = self
            .conn
            .query_row(
                Self::GET_TOKEN,
                params![address_key(address), chain_id],
                |row| token_from_row(row, 0),
            )
            .optional()?;
        Ok(token)
    }

    pub fn get_view(&self, address: &Address, chain_id: u64) -> Result<Option<TokenView>> {
        let view = self
            .conn
            .query_row(
                Self::GET_TOKEN_VIEW,
                params![address_key(address), chain_id],
                |row| {
                    Ok(TokenView {
                        token: token_from_row(row, 0)?,
                        network_name: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(view)
    }
}

/// Reads `address, chain_id, symbol, name, decimals` starting at column
/// `offset`. Returns `None` for a LEFT JOIN miss.
pub(crate) fn optional_token_from_row(row: &Row, offset: usize) -> rusqlite::Result<Option<Token>> {
    let address: Option<String> = row.get(offset)?;
    match address {
        Some(_) => token_from_row(row, offset).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn token_from_row(row: &Row, offset: usize) -> rusqlite::Result<Token> {
    Ok(Token {
        address: parse_address(row, offset)?,
        chain_id: row.get(offset + 1)?,
        symbol: row.get(offset + 2)?,
        name: row.get(offset + 3)?,
        decimals: row.get(offset + 4)?,
    })
}

pub(crate) fn parse_address(row: &Row, index: usize) -> rusqlite::Result<Address> {
    let raw: String = row.get(index)?;
    Address::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}
