//! Error types for the event aggregator

/// The error type emitted by the event aggregator
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// An event carries a value the aggregate cannot represent
    #[error("malformed event: {0}")]
    Decode(String),
    /// An event belongs to a block the state already reflects
    #[error("event at block {block} is not after the last applied block {last_applied}")]
    StaleEvent {
        /// The block of the offending event
        block: u64,
        /// The last block the state reflects
        last_applied: u64,
    },
}

#[allow(clippy::needless_pass_by_value)]
impl AggregationError {
    /// Create a new decode error
    pub fn decode<T: ToString>(msg: T) -> Self {
        Self::Decode(msg.to_string())
    }
}
