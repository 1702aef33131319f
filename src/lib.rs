pub mod applier;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod historical;
pub mod live;
pub mod metadata;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod source;

#[cfg(test)]
mod test_utils;
