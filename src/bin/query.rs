use anyhow::Result;
use clap::{Parser, Subcommand};
use token_route_indexer::config::Config;
use token_route_indexer::query::commands::{
    cmd_mappings, cmd_network, cmd_networks, cmd_token, cmd_token_mappings,
};
use token_route_indexer::query::formatters::OutputFormat;
use token_route_indexer::repository::{
    Database, MappingFilter, MappingRepository, NetworkRepository, TokenRepository,
};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query indexed cross-chain token mappings", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Active mappings, optionally filtered by source and destination chain.
    Mappings {
        #[arg(long)]
        src_chain_id: Option<u64>,

        #[arg(long)]
        dst_chain_id: Option<u64>,
    },
    /// Active routes leaving a token on a chain.
    TokenMappings { address: String, chain_id: u64 },
    Token { address: String, chain_id: u64 },
    Networks,
    Network { chain_id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url)?;
    let conn = db.lock()?;

    match cli.command {
        Commands::Mappings {
            src_chain_id,
            dst_chain_id,
        } => {
            let filter = MappingFilter {
                src_chain_id,
                dst_chain_id,
            };
            cmd_mappings(&MappingRepository::new(&conn), filter, &format)?;
        }
        Commands::TokenMappings { address, chain_id } => {
            cmd_token_mappings(&MappingRepository::new(&conn), &address, chain_id, &format)?;
        }
        Commands::Token { address, chain_id } => {
            cmd_token(&TokenRepository::new(&conn), &address, chain_id, &format)?;
        }
        Commands::Networks => {
            cmd_networks(&NetworkRepository::new(&conn), &format)?;
        }
        Commands::Network { chain_id } => {
            cmd_network(&NetworkRepository::new(&conn), chain_id, &format)?;
        }
    }

    Ok(())
}
