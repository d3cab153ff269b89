//! Error types for the endpoint pool

use crate::types::ChainId;

/// The error type emitted by the endpoint pool
#[derive(Debug, thiserror::Error)]
pub enum EndpointPoolError {
    /// Every endpoint is quarantined and none has an expired quarantine
    #[error("all {chain} endpoints are quarantined")]
    Exhausted {
        /// The chain whose pool is exhausted
        chain: ChainId,
    },
    /// The pool was built without any endpoints
    #[error("no endpoints configured for {chain}")]
    Empty {
        /// The chain whose pool is empty
        chain: ChainId,
    },
}
