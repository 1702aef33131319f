use crate::repository::{MappingView, Network, Token, TokenView};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_output(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    let _ = wtr.write_record(header);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn token_json(token: &Token) -> Value {
    json!({
        "address": format!("{:?}", token.address),
        "chain_id": token.chain_id,
        "symbol": token.symbol,
        "name": token.name,
        "decimals": token.decimals,
    })
}

fn symbol_of(token: &Option<Token>) -> String {
    token
        .as_ref()
        .and_then(|t| t.symbol.clone())
        .unwrap_or_else(|| "?".to_string())
}

fn network_label(name: &Option<String>, chain_id: u64) -> String {
    name.clone().unwrap_or_else(|| format!("Chain {chain_id}"))
}

pub fn format_mappings(views: &[MappingView], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if views.is_empty() {
                return "No mappings found.".to_string();
            }
            let mut table = new_table(vec![
                "Source Network",
                "Source Token",
                "Symbol",
                "Destination Network",
                "Destination Token",
                "Symbol",
                "Block",
                "Tx Hash",
            ]);
            for view in views {
                let key = &view.mapping.key;
                table.add_row(vec![
                    Cell::new(network_label(&view.src_network, key.src_chain_id)),
                    Cell::new(key.src_token.to_string()),
                    Cell::new(symbol_of(&view.src_token)),
                    Cell::new(network_label(&view.dst_network, key.dst_chain_id)),
                    Cell::new(key.dst_token.to_string()),
                    Cell::new(symbol_of(&view.dst_token)),
                    Cell::new(view.mapping.block_number),
                    Cell::new(format_tx_hash(&format!("{:?}", view.mapping.tx_hash))),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let mappings: Vec<_> = views
                .iter()
                .map(|view| {
                    let mapping = &view.mapping;
                    json!({
                        "src_token_address": format!("{:?}", mapping.key.src_token),
                        "src_chain_id": mapping.key.src_chain_id,
                        "dst_token_address": format!("{:?}", mapping.key.dst_token),
                        "dst_chain_id": mapping.key.dst_chain_id,
                        "is_active": mapping.is_active,
                        "block_number": mapping.block_number,
                        "tx_hash": format!("{:?}", mapping.tx_hash),
                        "timestamp": mapping.timestamp,
                        "src_token": view.src_token.as_ref().map(token_json),
                        "dst_token": view.dst_token.as_ref().map(token_json),
                        "src_network": view.src_network,
                        "dst_network": view.dst_network,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&mappings).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_output(
            &[
                "src_chain_id",
                "src_network",
                "src_token_address",
                "src_symbol",
                "dst_chain_id",
                "dst_network",
                "dst_token_address",
                "dst_symbol",
                "block_number",
                "tx_hash",
            ],
            views
                .iter()
                .map(|view| {
                    let key = &view.mapping.key;
                    vec![
                        key.src_chain_id.to_string(),
                        view.src_network.clone().unwrap_or_default(),
                        format!("{:?}", key.src_token),
                        view.src_token.as_ref().and_then(|t| t.symbol.clone()).unwrap_or_default(),
                        key.dst_chain_id.to_string(),
                        view.dst_network.clone().unwrap_or_default(),
                        format!("{:?}", key.dst_token),
                        view.dst_token.as_ref().and_then(|t| t.symbol.clone()).unwrap_or_default(),
                        view.mapping.block_number.to_string(),
                        format!("{:?}", view.mapping.tx_hash),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_token(view: Option<&TokenView>, format: &OutputFormat) -> String {
    let Some(view) = view else {
        return match format {
            OutputFormat::Json => json!({ "error": "Token not found" }).to_string(),
            _ => "Token not found.".to_string(),
        };
    };
    let token = &view.token;
    let network = network_label(&view.network_name, token.chain_id);
    let symbol = token.symbol.clone().unwrap_or_default();
    let name = token.name.clone().unwrap_or_default();
    let decimals = token.decimals.map_or("N/A".to_string(), |d| d.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec![Cell::new("Address"), Cell::new(token.address.to_string())]);
            table.add_row(vec![Cell::new("Network"), Cell::new(&network)]);
            table.add_row(vec![Cell::new("Chain Id"), Cell::new(token.chain_id)]);
            table.add_row(vec![Cell::new("Symbol"), Cell::new(&symbol)]);
            table.add_row(vec![Cell::new("Name"), Cell::new(&name)]);
            table.add_row(vec![Cell::new("Decimals"), Cell::new(&decimals)]);
            table.to_string()
        }
        OutputFormat::Json => {
            let mut value = token_json(token);
            value["network_name"] = json!(view.network_name);
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => csv_output(
            &["address", "chain_id", "network", "symbol", "name", "decimals"],
            vec![vec![
                format!("{:?}", token.address),
                token.chain_id.to_string(),
                network,
                symbol,
                name,
                decimals,
            ]],
        ),
    }
}

pub fn format_networks(networks: &[Network], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if networks.is_empty() {
                return "No networks found.".to_string();
            }
            let mut table = new_table(vec!["Chain Id", "Name", "Router", "Last Synced Block"]);
            for network in networks {
                table.add_row(vec![
                    Cell::new(network.chain_id),
                    Cell::new(&network.name),
                    Cell::new(network.router_address.to_string()),
                    Cell::new(network.last_synced_block),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let networks: Vec<_> = networks
                .iter()
                .map(|n| {
                    json!({
                        "chain_id": n.chain_id,
                        "name": n.name,
                        "router_address": format!("{:?}", n.router_address),
                        "last_synced_block": n.last_synced_block,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&networks).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_output(
            &["chain_id", "name", "router_address", "last_synced_block"],
            networks
                .iter()
                .map(|n| {
                    vec![
                        n.chain_id.to_string(),
                        n.name.clone(),
                        format!("{:?}", n.router_address),
                        n.last_synced_block.to_string(),
                    ]
                })
                .collect(),
        ),
    }
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
