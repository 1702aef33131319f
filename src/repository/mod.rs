pub mod database;
pub mod mapping_repository;
pub mod models;
pub mod network_repository;
pub mod registry;
pub mod token_repository;

pub use database::Database;
pub use mapping_repository::MappingRepository;
pub use models::{
    DEFAULT_DECIMALS, Mapping, MappingFilter, MappingKey, MappingView, Network, Token, TokenView,
    UNKNOWN_NAME, UNKNOWN_SYMBOL, address_key,
};
pub use network_repository::NetworkRepository;
pub use registry::MappingRegistry;
pub use token_repository::TokenRepository;
