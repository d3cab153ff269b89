//! Top-level scraper error definitions

use crate::{
    db::error::DbError, endpoint_pool::error::EndpointPoolError, relay_chain::ss58::Ss58Error,
    scanner::error::ScanError,
};

/// Errors raised while setting up the scraper
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    /// An invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An error in the database client
    #[error("database error: {0}")]
    Db(#[from] DbError),
    /// An error building an endpoint pool
    #[error("endpoint pool error: {0}")]
    EndpointPool(#[from] EndpointPoolError),
    /// An error initializing a scan loop
    #[error("scanner error: {0}")]
    Scan(#[from] ScanError),
    /// An invalid ss58 address
    #[error("invalid address: {0}")]
    Address(#[from] Ss58Error),
    /// An error installing logging or the metrics exporter
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

#[allow(clippy::needless_pass_by_value)]
impl ScraperError {
    /// Create a new configuration error
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a new telemetry error
    pub fn telemetry<T: ToString>(msg: T) -> Self {
        Self::Telemetry(msg.to_string())
    }
}
