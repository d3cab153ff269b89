//! Error types for chain reads

use std::fmt::Display;

use alloy::transports::RpcError;

use crate::types::ChainId;

/// Substrings of node replies that signal an oversized log query
const RANGE_TOO_LARGE_MARKERS: &[&str] =
    &["more than 10000 results", "too many results", "query returned more than"];

/// The error type emitted by a single call against one endpoint
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The endpoint could not be reached or answered with an error
    #[error("transport error: {0}")]
    Transport(String),
    /// The node refused a log query covering too many results
    #[error("range too large: {0}")]
    RangeTooLarge(String),
    /// The node's answer could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

#[allow(clippy::needless_pass_by_value)]
impl CallError {
    /// Create a new transport error
    pub fn transport<T: ToString>(msg: T) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a new decode error
    pub fn decode<T: ToString>(msg: T) -> Self {
        Self::Decode(msg.to_string())
    }
}

impl<E: Display> From<RpcError<E>> for CallError {
    fn from(e: RpcError<E>) -> Self {
        let msg = e.to_string();
        if is_range_too_large(&msg) {
            return CallError::RangeTooLarge(msg);
        }

        match e {
            RpcError::DeserError { .. } | RpcError::NullResp => CallError::Decode(msg),
            _ => CallError::Transport(msg),
        }
    }
}

impl From<alloy::contract::Error> for CallError {
    fn from(e: alloy::contract::Error) -> Self {
        match e {
            alloy::contract::Error::TransportError(e) => e.into(),
            other => CallError::Decode(other.to_string()),
        }
    }
}

impl From<parity_scale_codec::Error> for CallError {
    fn from(e: parity_scale_codec::Error) -> Self {
        CallError::Decode(e.to_string())
    }
}

/// Whether a node reply asks for a narrower log query
pub fn is_range_too_large(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    RANGE_TOO_LARGE_MARKERS.iter().any(|marker| msg.contains(marker))
}

/// The error type emitted by the chain reader
#[derive(Debug, thiserror::Error)]
pub enum ChainReaderError {
    /// Every attempt failed or no endpoint was available
    #[error("{chain} unavailable after {attempts} attempts: {last_error}")]
    ChainUnavailable {
        /// The chain being read
        chain: ChainId,
        /// The number of attempts made
        attempts: usize,
        /// The error of the final attempt
        last_error: String,
        /// Whether the final attempt timed out
        timed_out: bool,
    },
    /// A log query covered too many results
    #[error("{chain} rejected the block range: {message}")]
    RangeTooLarge {
        /// The chain being read
        chain: ChainId,
        /// The node's message
        message: String,
    },
    /// A node answer could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_too_large_detection() {
        assert!(is_range_too_large("query returned more than 10000 results"));
        assert!(is_range_too_large("Too many results, narrow the block range"));
        assert!(!is_range_too_large("connection reset by peer"));
    }
}
