//! The database-backed checkpoint store.
//!
//! A commit runs in one transaction: the cursor is advanced first, with a
//! conditional upsert that only moves it forward, and the delta is written
//! only if the cursor moved.

use async_trait::async_trait;
use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
use tracing::debug;

use crate::{
    checkpoint::{AggregateDelta, CheckpointStore, CommitOutcome, error::CheckpointError},
    db::{client::DbClient, models::AggregateOverwritesModel},
    types::{AggregateState, ChainId, RewardRow, ScanCursor, ScanTargetId},
};

#[async_trait]
impl CheckpointStore for DbClient {
    async fn load_cursor(
        &self,
        chain: ChainId,
        target: ScanTargetId,
    ) -> Result<Option<ScanCursor>, CheckpointError> {
        let mut conn = self.get_db_conn().await?;
        Ok(self.get_scan_cursor(chain, target, &mut conn).await?)
    }

    async fn load_aggregate_state(
        &self,
        chain: ChainId,
    ) -> Result<Option<AggregateState>, CheckpointError> {
        let mut conn = self.get_db_conn().await?;
        let Some(mut state) = self.get_aggregate_row(chain, &mut conn).await? else {
            return Ok(None);
        };

        state.holder_balances = self.get_holder_balances(chain, &mut conn).await?;
        match chain {
            ChainId::Parachain => {
                for record in self.get_ledgers(&mut conn).await? {
                    state.ledgers.insert(record.ledger, record);
                }
            },
            ChainId::RelayChain => {
                for record in self.get_relay_ledgers(&mut conn).await? {
                    state.relay_ledgers.insert(record.ledger, record);
                }
            },
        }

        Ok(Some(state))
    }

    async fn commit(
        &self,
        cursor: &ScanCursor,
        delta: &AggregateDelta,
    ) -> Result<CommitOutcome, CheckpointError> {
        let overwrites = AggregateOverwritesModel::from_delta(delta)?;
        let mut conn = self.get_db_conn().await?;

        conn.transaction(move |conn| {
            async move {
                if !self.advance_scan_cursor(cursor, conn).await? {
                    debug!(chain = %cursor.chain, target = %cursor.target, "cursor already advanced");
                    return Ok(CommitOutcome::AlreadyApplied);
                }

                let chain = delta.chain;
                self.ensure_aggregate_row(chain, conn).await?;
                self.overwrite_aggregates(chain, &overwrites, conn).await?;
                self.increment_aggregates(chain, &delta.counters, conn).await?;
                self.write_holder_balances(chain, &delta.holder_balances, conn).await?;
                self.insert_reward_rows(&delta.reward_rows, conn).await?;
                self.upsert_ledgers(&delta.ledgers, conn).await?;
                self.upsert_relay_ledgers(&delta.relay_ledgers, conn).await?;
                if let Some(infos) = &delta.validators_info {
                    self.replace_validators_info(infos, conn).await?;
                }

                Ok(CommitOutcome::Applied)
            }
            .scope_boxed()
        })
        .await
    }

    async fn query_recent_rewards(&self, limit: usize) -> Result<Vec<RewardRow>, CheckpointError> {
        let mut conn = self.get_db_conn().await?;
        Ok(self.get_recent_rewards(limit, &mut conn).await?)
    }
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use alloy::primitives::{Address, I256, U256};
    use diesel::{ExpressionMethods, QueryDsl};
    use diesel_async::RunQueryDsl;

    use super::*;
    use crate::{
        db::{
            schema::aggregates,
            test_utils::{cleanup_test_db, setup_test_db_client},
            utils::u256_to_bigdecimal,
        },
        types::{LedgerRecord, ValidatorsInfo},
    };

    /// A reward row of the given ledger
    fn reward(ledger: u8, reward: i64, block_number: u64) -> RewardRow {
        RewardRow {
            ledger: Address::repeat_byte(ledger),
            reward: I256::try_from(reward).unwrap(),
            balance: U256::from(1_000u64),
            block_number,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_is_idempotent() -> eyre::Result<()> {
        let test_db = setup_test_db_client().await?;
        let store = &test_db.client;

        let cursor = ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 3);
        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.counters.deposited = U256::from(100u64);
        delta.counters.buffered_deposits = U256::from(100u64);
        delta.counters.deposited_count = 1;
        delta.holder_balances.insert(Address::repeat_byte(7), U256::from(100u64));
        delta.holders_number = Some(1);
        delta.reward_rows.push(reward(1, -3, 2));
        delta.scalars.last_block_with_events = Some(3);

        assert_eq!(store.commit(&cursor, &delta).await?, CommitOutcome::Applied);
        let first = store.load_aggregate_state(ChainId::Parachain).await?;
        assert_eq!(store.commit(&cursor, &delta).await?, CommitOutcome::AlreadyApplied);
        let second = store.load_aggregate_state(ChainId::Parachain).await?;

        assert_eq!(first, second);
        let state = second.unwrap();
        assert_eq!(state.deposited, U256::from(100u64));
        assert_eq!(state.deposited_count, 1);
        assert_eq!(state.holders_number, 1);
        assert_eq!(state.last_block_with_events, Some(3));
        assert_eq!(store.query_recent_rewards(10).await?, vec![reward(1, -3, 2)]);

        cleanup_test_db(test_db).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lagging_events_do_not_double_count_buffers() -> eyre::Result<()> {
        let test_db = setup_test_db_client().await?;
        let store = &test_db.client;

        // The snapshot loop reads the contract at the chain head first
        let snapshot_cursor = ScanCursor::new(ChainId::Parachain, ScanTargetId::ParachainState, 100);
        let mut snapshot = AggregateDelta::new(ChainId::Parachain);
        snapshot.scalars.contract_buffered_deposits = Some(U256::from(100u64));
        snapshot.scalars.contract_buffered_redeems = Some(U256::from(7u64));
        snapshot.scalars.total_supply = Some(U256::from(1_000u64));
        snapshot.ledgers.push(LedgerRecord { ledger: Address::repeat_byte(1), ..Default::default() });
        store.commit(&snapshot_cursor, &snapshot).await?;

        // The events loop then catches up over [1, 3]
        let events_cursor = ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 3);
        let mut events = AggregateDelta::new(ChainId::Parachain);
        events.counters.buffered_deposits = U256::from(100u64);
        events.counters.deposited = U256::from(100u64);
        events.counters.deposited_count = 1;
        events.counters.buffered_redeems_drawn = U256::from(10u64);
        store.commit(&events_cursor, &events).await?;

        let state = store.load_aggregate_state(ChainId::Parachain).await?.unwrap();
        assert_eq!(state.buffered_deposits, U256::from(100u64));
        assert_eq!(state.contract_buffered_deposits, U256::from(100u64));
        assert_eq!(state.contract_buffered_redeems, U256::from(7u64));
        // nothing was buffered to draw from
        assert_eq!(state.buffered_redeems, U256::ZERO);
        assert_eq!(state.total_supply, U256::from(1_000u64));
        assert_eq!(state.ledgers.len(), 1);

        let cursor = store.load_cursor(ChainId::Parachain, ScanTargetId::ParachainState).await?;
        assert_eq!(cursor.map(|c| c.last_processed_block), Some(100));

        cleanup_test_db(test_db).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_redeems_draw_down_stored_buffer() -> eyre::Result<()> {
        let test_db = setup_test_db_client().await?;
        let store = &test_db.client;

        // No Redeemed event grows the buffer, seed it on the row directly
        let mut conn = store.get_db_conn().await?;
        store.ensure_aggregate_row(ChainId::Parachain, &mut conn).await?;
        diesel::update(aggregates::table)
            .filter(aggregates::chain.eq(ChainId::Parachain.as_str()))
            .set(aggregates::buffered_redeems.eq(u256_to_bigdecimal(U256::from(50u64))))
            .execute(&mut conn)
            .await?;
        drop(conn);

        let mut events = AggregateDelta::new(ChainId::Parachain);
        events.counters.buffered_redeems_drawn = U256::from(10u64);
        events.counters.redeemed = U256::from(10u64);
        events.counters.redeemed_count = 1;
        store.commit(&ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 5), &events).await?;

        let state = store.load_aggregate_state(ChainId::Parachain).await?.unwrap();
        assert_eq!(state.buffered_redeems, U256::from(40u64));
        assert_eq!(state.redeemed, U256::from(10u64));
        assert_eq!(state.redeemed_count, 1);

        cleanup_test_db(test_db).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recent_rewards_are_bounded_per_ledger() -> eyre::Result<()> {
        let test_db = setup_test_db_client().await?;
        let store = &test_db.client;

        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.reward_rows = vec![reward(1, 1, 1), reward(1, 2, 2), reward(1, 3, 3), reward(2, 4, 1)];
        delta.validators_info = Some(vec![ValidatorsInfo {
            ledger: Address::repeat_byte(1),
            stash: "5Stash".into(),
            active_stake: U256::from(10u64),
            validators: vec!["5A".into()],
        }]);
        store.commit(&ScanCursor::new(ChainId::Parachain, ScanTargetId::Events, 3), &delta).await?;

        let rows = store.query_recent_rewards(2).await?;
        assert_eq!(rows, vec![reward(1, 3, 3), reward(1, 2, 2), reward(2, 4, 1)]);

        let mut conn = store.get_db_conn().await?;
        assert_eq!(store.get_validators_info(&mut conn).await?.len(), 1);
        drop(conn);

        cleanup_test_db(test_db).await?;
        Ok(())
    }
}
