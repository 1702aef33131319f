use crate::query::formatters::{OutputFormat, format_mappings, format_networks, format_token};
use crate::repository::{MappingFilter, MappingRepository, NetworkRepository, TokenRepository};
use alloy_primitives::Address;
use anyhow::{Result, anyhow};
use std::str::FromStr;

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|_| anyhow!("Invalid address format: {}", address))
}

pub fn cmd_mappings(
    mapping_repo: &MappingRepository,
    filter: MappingFilter,
    format: &OutputFormat,
) -> Result<()> {
    let views = mapping_repo.query_active_views(&filter)?;
    println!("{}", format_mappings(&views, format));
    Ok(())
}

/// Where a source token is routed to from `chain_id`.
pub fn cmd_token_mappings(
    mapping_repo: &MappingRepository,
    address: &str,
    chain_id: u64,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;
    let views = mapping_repo.views_by_source_token(&address, chain_id)?;
    println!("{}", format_mappings(&views, format));
    Ok(())
}

pub fn cmd_token(
    token_repo: &TokenRepository,
    address: &str,
    chain_id: u64,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;
    let view = token_repo.get_view(&address, chain_id)?;
    println!("{}", format_token(view.as_ref(), format));
    Ok(())
}

pub fn cmd_networks(network_repo: &NetworkRepository, format: &OutputFormat) -> Result<()> {
    let networks = network_repo.list()?;
    println!("{}", format_networks(&networks, format));
    Ok(())
}

pub fn cmd_network(
    network_repo: &NetworkRepository,
    chain_id: u64,
    format: &OutputFormat,
) -> Result<()> {
    let network = network_repo
        .get(chain_id)?
        .ok_or_else(|| anyhow!("Network {} is not indexed", chain_id))?;
    println!("{}", format_networks(&[network], format));
    Ok(())
}
