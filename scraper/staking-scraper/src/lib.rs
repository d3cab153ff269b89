//! The staking scraper's library definitions

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::needless_pass_by_ref_mut)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::unused_async)]

pub mod aggregator;
pub mod chain_reader;
pub mod checkpoint;
pub mod cli;
pub mod db;
pub mod endpoint_pool;
pub mod error;
pub mod metrics_engine;
pub mod parachain;
pub mod publisher;
pub mod relay_chain;
pub mod scanner;
pub mod scraper;
pub mod targets;
pub mod telemetry;
pub mod types;
pub mod utils;
