//! Error types for scan loops

use crate::{
    aggregator::error::AggregationError, chain_reader::error::ChainReaderError,
    checkpoint::error::CheckpointError, scanner::WindowKind,
};

/// How a scan loop recovers from a failed window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Narrow the window and retry immediately
    ShrinkRange,
    /// Narrow the window and retry after a backoff
    ShrinkRangeAndBackoff,
    /// Retry the same window after a backoff
    Backoff,
}

/// The error type emitted by a scan step
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A chain read failed
    #[error("chain error: {0}")]
    Chain(#[from] ChainReaderError),
    /// The window could not be folded into the aggregate state
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),
    /// The checkpoint store failed
    #[error("store error: {0}")]
    Store(#[from] CheckpointError),
}

impl ScanError {
    /// How a loop with the given window kind recovers from this error
    pub fn recovery(&self, kind: WindowKind) -> Recovery {
        match (self, kind) {
            (ScanError::Chain(ChainReaderError::RangeTooLarge { .. }), WindowKind::Ranged) => {
                Recovery::ShrinkRange
            },
            (
                ScanError::Chain(ChainReaderError::ChainUnavailable { timed_out: true, .. }),
                WindowKind::Ranged,
            ) => Recovery::ShrinkRangeAndBackoff,
            _ => Recovery::Backoff,
        }
    }
}
