//! Command-line interface for the staking scraper

use std::time::Duration;

use alloy::primitives::Address;
use clap::Parser;

use crate::{
    error::ScraperError,
    parachain::ContractAddresses,
    types::ProtocolConstants,
};

/// The URL schemes accepted for chain endpoints
const ENDPOINT_SCHEMES: [&str; 2] = ["ws://", "wss://"];

/// The staking scraper CLI
#[rustfmt::skip]
#[derive(Parser, Debug, Clone)]
#[clap(about = "Liquid staking metrics scraper")]
pub struct Cli {
    // -------------
    // | Endpoints |
    // -------------

    /// The websocket endpoints of the parachain, comma-separated
    #[clap(long, env = "WS_URLS_PARA", value_delimiter = ',')]
    pub ws_urls_para: Vec<String>,
    /// The websocket endpoints of the relay chain, comma-separated
    #[clap(long, env = "WS_URLS_RELAY", value_delimiter = ',')]
    pub ws_urls_relay: Vec<String>,
    /// The time allowed for every chain call, in seconds
    #[clap(long, env = "TIMEOUT", default_value = "60")]
    pub timeout: u64,

    // ------------
    // | Database |
    // ------------

    /// The database URL
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: String,
    /// The database URL of the token price collector.
    ///
    /// If not provided, the USD value of the total supply is not exported.
    #[clap(long, env = "DATABASE_URL_TOKEN_PRICE_COLLECTOR")]
    pub database_url_token_price_collector: Option<String>,
    /// The symbol of the token whose price is read from the collector
    #[clap(long, env = "TOKEN_SYMBOL", default_value = "ksm")]
    pub token_symbol: String,
    /// The number of reward rows per ledger read back for APR averages
    #[clap(long, env = "DATABASE_QUERY_LIMIT", default_value = "100")]
    pub database_query_limit: usize,

    // ------------
    // | Scanning |
    // ------------

    /// The first parachain block of the events loop
    #[clap(long, env = "INITIAL_BLOCK_NUMBER_AGGREGATED_METRICS_EXPORTER", default_value = "0")]
    pub initial_block_number: u64,
    /// The largest range of blocks requested at once
    #[clap(long, env = "MAX_RANGE_OF_BLOCKS", default_value = "2500")]
    pub max_range_of_blocks: u64,
    /// The pause between height polls once a loop is caught up, in
    /// milliseconds
    #[clap(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,
    /// The longest backoff after repeated failures, in seconds
    #[clap(long, env = "MAX_BACKOFF_SECS", default_value = "60")]
    pub max_backoff_secs: u64,
    /// The pause between two validators info exports, in seconds
    #[clap(long, env = "VALIDATORS_INFO_EXPORTER_WAITING_TIME", default_value = "60")]
    pub validators_info_waiting_time: u64,

    // ----------------------
    // | Protocol Constants |
    // ----------------------

    /// The ideal fraction of total issuance that is staked
    #[clap(long, env = "STAKE_TARGET", default_value = "0.75")]
    pub stake_target: f64,
    /// The maximum number of auctions that lower the ideal stake
    #[clap(long, env = "AUCTION_MAX", default_value = "60")]
    pub auction_max: u32,
    /// The ideal stake reduction per active auction
    #[clap(long, env = "AUCTION_ADJUST", default_value = "0")]
    pub auction_adjust: f64,
    /// The maximum yearly inflation
    #[clap(long, env = "MAX_INFLATION", default_value = "0.1")]
    pub max_inflation: f64,
    /// The minimum yearly inflation
    #[clap(long, env = "MIN_INFLATION", default_value = "0.025")]
    pub min_inflation: f64,
    /// The decay rate of inflation beyond the ideal stake
    #[clap(long, env = "FALLOFF", default_value = "0.05")]
    pub falloff: f64,
    /// The length of an era in relay chain blocks
    #[clap(long, env = "ERA_DURATION_IN_BLOCKS", default_value = "600")]
    pub era_duration_in_blocks: u64,
    /// The number of eras in a day
    #[clap(long, env = "ERAS_PER_DAY", default_value = "4")]
    pub eras_per_day: u64,
    /// The lowest per-report APR admitted into averages, in percent
    #[clap(long, env = "APR_MIN", default_value = "3")]
    pub apr_min: f64,
    /// The highest per-report APR admitted into averages, in percent
    #[clap(long, env = "APR_MAX", default_value = "45")]
    pub apr_max: f64,

    // -------------
    // | Contracts |
    // -------------

    /// The address of the Nimbus contract
    #[clap(long, env = "NIMBUS_CONTRACT_ADDRESS")]
    pub nimbus_contract_address: Address,
    /// The address of the OracleMaster contract
    #[clap(long, env = "ORACLE_MASTER_CONTRACT_ADDRESS")]
    pub oracle_master_contract_address: Address,
    /// The address of the Withdrawal contract
    #[clap(long, env = "WITHDRAWAL_CONTRACT_ADDRESS")]
    pub withdrawal_contract_address: Address,
    /// The address of the xcToken contract
    #[clap(long, env = "XCTOKEN_CONTRACT_ADDRESS")]
    pub xctoken_contract_address: Address,
    /// The address of the Controller contract
    #[clap(long, env = "CONTROLLER_CONTRACT_ADDRESS")]
    pub controller_contract_address: Address,

    // ---------------
    // | Relay Chain |
    // ---------------

    /// The ss58 address format of the relay chain
    #[clap(long, env = "SS58_FORMAT_RELAY", default_value = "42")]
    pub ss58_format_relay: u16,
    /// The ss58 address of the payout service account
    #[clap(long, env = "PAYOUT_SERVICE_ADDRESS")]
    pub payout_service_address: Option<String>,

    // -------------
    // | Telemetry |
    // -------------

    /// The port on which Prometheus metrics are served
    #[clap(long, env = "PROMETHEUS_METRICS_PORT", default_value = "8000")]
    pub prometheus_metrics_port: u16,
    /// The prefix of every exported metric name
    #[clap(long, env = "PROMETHEUS_METRICS_PREFIX", default_value = "")]
    pub prometheus_metrics_prefix: String,
    /// The log filter, used when `RUST_LOG` is unset
    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    /// Whether to write human-readable logs instead of JSON
    #[clap(long, env = "PRETTY_LOGS")]
    pub pretty_logs: bool,
}

impl Cli {
    /// Check the values clap cannot check on its own
    pub fn validate(&self) -> Result<(), ScraperError> {
        validate_urls("WS_URLS_PARA", &self.ws_urls_para)?;
        validate_urls("WS_URLS_RELAY", &self.ws_urls_relay)?;

        if self.apr_min > self.apr_max {
            return Err(ScraperError::config(format!(
                "APR_MIN ({}) exceeds APR_MAX ({})",
                self.apr_min, self.apr_max
            )));
        }

        let positive = [
            ("MAX_RANGE_OF_BLOCKS", self.max_range_of_blocks),
            ("TIMEOUT", self.timeout),
            ("ERA_DURATION_IN_BLOCKS", self.era_duration_in_blocks),
            ("ERAS_PER_DAY", self.eras_per_day),
            ("DATABASE_QUERY_LIMIT", self.database_query_limit as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ScraperError::config(format!("{name} must be positive")));
        }

        if self.min_inflation > self.max_inflation {
            return Err(ScraperError::config("MIN_INFLATION exceeds MAX_INFLATION"));
        }

        Ok(())
    }

    /// The protocol constants used by the APR and inflation formulas
    pub fn protocol_constants(&self) -> ProtocolConstants {
        ProtocolConstants {
            stake_target: self.stake_target,
            auction_max: self.auction_max,
            auction_adjust: self.auction_adjust,
            max_inflation: self.max_inflation,
            min_inflation: self.min_inflation,
            falloff: self.falloff,
            era_duration_in_blocks: self.era_duration_in_blocks,
            eras_per_day: self.eras_per_day,
            apr_min: self.apr_min,
            apr_max: self.apr_max,
        }
    }

    /// The liquid staking contract addresses
    pub fn contract_addresses(&self) -> ContractAddresses {
        ContractAddresses {
            nimbus: self.nimbus_contract_address,
            oracle_master: self.oracle_master_contract_address,
            withdrawal: self.withdrawal_contract_address,
            xctoken: self.xctoken_contract_address,
            controller: self.controller_contract_address,
        }
    }

    /// The time allowed for every chain call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Check that a list of endpoints is non-empty and uses websocket schemes
fn validate_urls(name: &str, urls: &[String]) -> Result<(), ScraperError> {
    if urls.iter().all(|url| url.trim().is_empty()) {
        return Err(ScraperError::config(format!("{name} is empty")));
    }

    let invalid = urls.iter().find(|url| !ENDPOINT_SCHEMES.iter().any(|s| url.starts_with(s)));
    if let Some(url) = invalid {
        return Err(ScraperError::config(format!("{name} contains a non-websocket url: {url}")));
    }

    Ok(())
}
