//! A mock checkpoint store implementation for testing

use std::collections::{BTreeMap, HashMap};

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    checkpoint::{AggregateDelta, CheckpointStore, CommitOutcome, error::CheckpointError},
    types::{AggregateState, ChainId, RewardRow, ScanCursor, ScanTargetId, ValidatorsInfo},
};

// ---------
// | Types |
// ---------

/// The contents of the mock store
#[derive(Default)]
struct MockStoreState {
    /// Cursors keyed by scan loop
    cursors: HashMap<(ChainId, ScanTargetId), ScanCursor>,
    /// Aggregate state keyed by chain
    aggregates: HashMap<ChainId, AggregateState>,
    /// Every reward row, in insertion order
    rewards: Vec<RewardRow>,
    /// The current validators info set
    validators_info: Vec<ValidatorsInfo>,
    /// The number of commits that were applied
    applied_commits: usize,
    /// The number of upcoming commits that fail
    failing_commits: usize,
}

// -------------------------
// | Mock Checkpoint Store |
// -------------------------

/// An in-memory checkpoint store with the same commit semantics as the
/// database-backed store
#[derive(Default)]
pub struct MockCheckpointStore {
    /// The store contents, behind a mutex so every commit is atomic
    state: Mutex<MockStoreState>,
}

impl MockCheckpointStore {
    /// Make the next `n` commits fail as if the store were unreachable
    pub async fn fail_next_commits(&self, n: usize) {
        self.state.lock().await.failing_commits = n;
    }

    /// The number of commits applied so far
    pub async fn applied_commits(&self) -> usize {
        self.state.lock().await.applied_commits
    }

    /// Every reward row committed so far, in insertion order
    pub async fn reward_rows(&self) -> Vec<RewardRow> {
        self.state.lock().await.rewards.clone()
    }

    /// The current validators info set
    pub async fn validators_info(&self) -> Vec<ValidatorsInfo> {
        self.state.lock().await.validators_info.clone()
    }

    /// Seed the store with reward rows
    pub async fn insert_reward_rows(&self, rows: Vec<RewardRow>) {
        self.state.lock().await.rewards.extend(rows);
    }
}

// -----------------------------------------
// | Checkpoint Store Trait Implementation |
// -----------------------------------------

#[async_trait]
impl CheckpointStore for MockCheckpointStore {
    async fn load_cursor(
        &self,
        chain: ChainId,
        target: ScanTargetId,
    ) -> Result<Option<ScanCursor>, CheckpointError> {
        Ok(self.state.lock().await.cursors.get(&(chain, target)).cloned())
    }

    async fn load_aggregate_state(
        &self,
        chain: ChainId,
    ) -> Result<Option<AggregateState>, CheckpointError> {
        Ok(self.state.lock().await.aggregates.get(&chain).cloned())
    }

    async fn commit(
        &self,
        cursor: &ScanCursor,
        delta: &AggregateDelta,
    ) -> Result<CommitOutcome, CheckpointError> {
        let mut state = self.state.lock().await;
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(CheckpointError::unavailable("injected commit failure"));
        }

        let key = (cursor.chain, cursor.target);
        let already_applied = state
            .cursors
            .get(&key)
            .is_some_and(|stored| stored.last_processed_block >= cursor.last_processed_block);
        if already_applied {
            return Ok(CommitOutcome::AlreadyApplied);
        }

        state
            .aggregates
            .entry(delta.chain)
            .or_insert_with(|| AggregateState::new(delta.chain))
            .apply_delta(delta);
        state.rewards.extend(delta.reward_rows.iter().cloned());
        if let Some(validators_info) = &delta.validators_info {
            state.validators_info = validators_info.clone();
        }
        state.cursors.insert(key, cursor.clone());
        state.applied_commits += 1;

        Ok(CommitOutcome::Applied)
    }

    async fn query_recent_rewards(&self, limit: usize) -> Result<Vec<RewardRow>, CheckpointError> {
        let state = self.state.lock().await;

        // Later insertions win ties on the block number, as with the serial ids
        // of the rewards table
        let mut by_ledger: BTreeMap<Address, Vec<RewardRow>> = BTreeMap::new();
        for row in state.rewards.iter().rev() {
            by_ledger.entry(row.ledger).or_default().push(row.clone());
        }

        let mut rows = Vec::new();
        for (_, mut ledger_rows) in by_ledger {
            ledger_rows.sort_by(|a, b| b.block_number.cmp(&a.block_number));
            rows.extend(ledger_rows.into_iter().take(limit));
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{I256, U256};

    use super::*;

    /// Build a reward row
    fn reward(ledger: Address, reward: i64, block_number: u64) -> RewardRow {
        RewardRow {
            ledger,
            reward: I256::try_from(reward).unwrap(),
            balance: U256::from(1_000u64),
            block_number,
        }
    }

    #[tokio::test]
    async fn test_duplicate_commit_is_already_applied() {
        let store = MockCheckpointStore::default();
        let cursor = ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 3);
        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.counters.deposited = U256::from(100u64);
        delta.counters.deposited_count = 1;

        assert_eq!(store.commit(&cursor, &delta).await.unwrap(), CommitOutcome::Applied);
        let first = store.load_aggregate_state(ChainId::Parachain).await.unwrap();

        assert_eq!(store.commit(&cursor, &delta).await.unwrap(), CommitOutcome::AlreadyApplied);
        let second = store.load_aggregate_state(ChainId::Parachain).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.applied_commits().await, 1);
    }

    #[tokio::test]
    async fn test_older_cursor_rejected() {
        let store = MockCheckpointStore::default();
        let delta = AggregateDelta::new(ChainId::RelayChain);
        let newer = ScanCursor::new(ChainId::RelayChain, ScanTargetId::RelayState, 10);
        let older = ScanCursor::new(ChainId::RelayChain, ScanTargetId::RelayState, 9);

        store.commit(&newer, &delta).await.unwrap();
        assert_eq!(store.commit(&older, &delta).await.unwrap(), CommitOutcome::AlreadyApplied);

        let cursor = store.load_cursor(ChainId::RelayChain, ScanTargetId::RelayState).await.unwrap();
        assert_eq!(cursor.unwrap().last_processed_block, 10);
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let store = MockCheckpointStore::default();
        store.fail_next_commits(1).await;

        let cursor = ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 1);
        let delta = AggregateDelta::new(ChainId::Parachain);
        assert!(store.commit(&cursor, &delta).await.is_err());
        assert!(store.load_cursor(ChainId::Parachain, ScanTargetId::Events).await.unwrap().is_none());

        assert_eq!(store.commit(&cursor, &delta).await.unwrap(), CommitOutcome::Applied);
    }

    #[tokio::test]
    async fn test_recent_rewards_limited_per_ledger() {
        let store = MockCheckpointStore::default();
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        store
            .insert_reward_rows(vec![
                reward(a, 1, 1),
                reward(a, 2, 2),
                reward(b, 3, 2),
                reward(a, 3, 3),
            ])
            .await;

        let rows = store.query_recent_rewards(2).await.unwrap();
        let a_blocks: Vec<u64> =
            rows.iter().filter(|r| r.ledger == a).map(|r| r.block_number).collect();
        let b_blocks: Vec<u64> =
            rows.iter().filter(|r| r.ledger == b).map(|r| r.block_number).collect();

        assert_eq!(a_blocks, vec![3, 2]);
        assert_eq!(b_blocks, vec![2]);
    }
}
