//! Defines an abstract interface for the durable store of scan cursors and
//! aggregate state.
//!
//! A commit applies a window's aggregate delta and advances the window's
//! cursor as one atomic operation. A commit whose block does not move the
//! stored cursor forward is a no-op, which makes replaying a window after a
//! crash harmless.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    checkpoint::error::CheckpointError,
    types::{AggregateState, ChainId, RewardRow, ScanCursor, ScanTargetId},
};

pub mod delta;
pub mod error;
#[cfg(any(test, feature = "integration"))]
pub mod mock_checkpoint_store;

pub use delta::AggregateDelta;

/// The result of a commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The delta was applied and the cursor advanced
    Applied,
    /// The stored cursor was already at or beyond the commit's block, nothing
    /// was written
    AlreadyApplied,
}

// --------------------
// | Trait Definition |
// --------------------

/// A durable store for scan cursors and aggregate state
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the cursor of the given scan loop, if it has ever committed
    async fn load_cursor(
        &self,
        chain: ChainId,
        target: ScanTargetId,
    ) -> Result<Option<ScanCursor>, CheckpointError>;

    /// Load the aggregate state of the given chain, if it has ever been
    /// written
    async fn load_aggregate_state(
        &self,
        chain: ChainId,
    ) -> Result<Option<AggregateState>, CheckpointError>;

    /// Apply a delta and advance the cursor atomically
    async fn commit(
        &self,
        cursor: &ScanCursor,
        delta: &AggregateDelta,
    ) -> Result<CommitOutcome, CheckpointError>;

    /// The latest `limit` reward rows of every ledger, newest first
    async fn query_recent_rewards(&self, limit: usize) -> Result<Vec<RewardRow>, CheckpointError>;
}

#[async_trait]
impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    async fn load_cursor(
        &self,
        chain: ChainId,
        target: ScanTargetId,
    ) -> Result<Option<ScanCursor>, CheckpointError> {
        self.as_ref().load_cursor(chain, target).await
    }

    async fn load_aggregate_state(
        &self,
        chain: ChainId,
    ) -> Result<Option<AggregateState>, CheckpointError> {
        self.as_ref().load_aggregate_state(chain).await
    }

    async fn commit(
        &self,
        cursor: &ScanCursor,
        delta: &AggregateDelta,
    ) -> Result<CommitOutcome, CheckpointError> {
        self.as_ref().commit(cursor, delta).await
    }

    async fn query_recent_rewards(&self, limit: usize) -> Result<Vec<RewardRow>, CheckpointError> {
        self.as_ref().query_recent_rewards(limit).await
    }
}
