//! Folds a window of Nimbus events into the aggregate state.
//!
//! The fold is pure: it produces the next state along with the delta the
//! checkpoint store persists, and touches neither the chain nor the store.

use alloy::primitives::{Address, I256, U256};
use tracing::{debug, warn};

use crate::{
    aggregator::error::AggregationError,
    checkpoint::AggregateDelta,
    metrics_engine::average_apr,
    types::{AggregateState, EventPayload, EventRecord, LedgerRecord, ProtocolConstants, RewardRow},
};

pub mod error;

/// The result of applying one window
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedWindow {
    /// The state after the window
    pub state: AggregateState,
    /// The changes the window makes to the stored state
    pub delta: AggregateDelta,
}

/// The event fold, parameterized by the APR configuration
#[derive(Clone, Copy, Debug)]
pub struct EventAggregator {
    /// The number of eras per day, used to annualize rewards
    eras_per_day: u64,
    /// The lowest APR a report may show to be averaged
    apr_min: f64,
    /// The highest APR a report may show to be averaged
    apr_max: f64,
    /// The number of reward rows per ledger the APR is averaged over
    history_limit: usize,
}

impl EventAggregator {
    /// Create a new aggregator
    pub fn new(constants: &ProtocolConstants, history_limit: usize) -> Self {
        Self {
            eras_per_day: constants.eras_per_day,
            apr_min: constants.apr_min,
            apr_max: constants.apr_max,
            history_limit: history_limit.max(1),
        }
    }

    /// The number of reward rows per ledger the APR is averaged over
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Apply a window of events and ledger snapshots to the state
    pub fn apply(
        &self,
        state: &AggregateState,
        mut events: Vec<EventRecord>,
        ledger_snapshots: Vec<LedgerRecord>,
    ) -> Result<AppliedWindow, AggregationError> {
        events.sort_by_key(EventRecord::ordering_key);
        events.dedup_by(|later, earlier| {
            let duplicate = later.ordering_key() == earlier.ordering_key();
            if duplicate {
                warn!(
                    block = later.block_number,
                    log_index = later.log_index,
                    "dropping duplicate event"
                );
            }
            duplicate
        });

        if let (Some(first), Some(last_applied)) = (events.first(), state.last_block_with_events) {
            if first.block_number <= last_applied {
                return Err(AggregationError::StaleEvent { block: first.block_number, last_applied });
            }
        }

        let mut next = state.clone();
        let mut delta = AggregateDelta::new(state.chain);
        let mut saw_transfer = false;

        for block_events in events.chunk_by(|a, b| a.block_number == b.block_number) {
            let block = block_events[0].block_number;
            let mut saw_report = false;

            for event in block_events {
                match &event.payload {
                    EventPayload::Transfer { from, to, value } => {
                        apply_transfer(&mut next, &mut delta, *from, *to, *value);
                        saw_transfer = true;
                    },
                    EventPayload::Deposited { amount, .. } => {
                        next.buffered_deposits = next.buffered_deposits.saturating_add(*amount);
                        next.deposited = next.deposited.saturating_add(*amount);
                        next.deposited_count += 1;

                        let c = &mut delta.counters;
                        c.buffered_deposits = c.buffered_deposits.saturating_add(*amount);
                        c.deposited = c.deposited.saturating_add(*amount);
                        c.deposited_count += 1;
                    },
                    EventPayload::Redeemed { amount, .. } => {
                        next.buffered_redeems = next.buffered_redeems.saturating_sub(*amount);
                        next.redeemed = next.redeemed.saturating_add(*amount);
                        next.redeemed_count += 1;

                        let c = &mut delta.counters;
                        c.buffered_redeems_drawn = c.buffered_redeems_drawn.saturating_add(*amount);
                        c.redeemed = c.redeemed.saturating_add(*amount);
                        c.redeemed_count += 1;
                    },
                    EventPayload::Rewards { ledger, rewards, balance } => {
                        next.rewards_aggregated = next.rewards_aggregated.saturating_add(*rewards);
                        delta.counters.rewards_aggregated =
                            delta.counters.rewards_aggregated.saturating_add(*rewards);

                        let reward = signed(*rewards, block)?;
                        self.record_report(&mut next, &mut delta, *ledger, reward, *balance, block);
                        saw_report = true;
                    },
                    EventPayload::Losses { ledger, losses, balance } => {
                        next.losses_aggregated = next.losses_aggregated.saturating_add(*losses);
                        delta.counters.losses_aggregated =
                            delta.counters.losses_aggregated.saturating_add(*losses);

                        let reward = -signed(*losses, block)?;
                        self.record_report(&mut next, &mut delta, *ledger, reward, *balance, block);
                        saw_report = true;
                    },
                }
            }

            next.last_block_with_events = Some(block);
            delta.scalars.last_block_with_events = Some(block);

            if saw_report {
                next.apr = average_apr(
                    next.apr,
                    next.recent_rewards.values().flatten(),
                    self.eras_per_day,
                    self.apr_min,
                    self.apr_max,
                );
                delta.scalars.apr = Some(next.apr);
                debug!(block, apr = next.apr, "recomputed apr");
            }
        }

        if saw_transfer {
            next.holders_number = next.holder_balances.len() as u64;
            delta.holders_number = Some(next.holders_number);
        }

        for ledger in ledger_snapshots {
            next.ledgers.insert(ledger.ledger, ledger.clone());
            delta.ledgers.push(ledger);
        }

        debug!(events = events.len(), holders = next.holders_number, "applied event window");
        Ok(AppliedWindow { state: next, delta })
    }

    /// Record a ledger report in the reward history
    fn record_report(
        &self,
        next: &mut AggregateState,
        delta: &mut AggregateDelta,
        ledger: Address,
        reward: I256,
        balance: U256,
        block_number: u64,
    ) {
        let row = RewardRow { ledger, reward, balance, block_number };
        next.push_reward_row(row.clone(), self.history_limit);
        delta.reward_rows.push(row);
    }
}

/// Move tracked balance between two holders, the zero address is never tracked
fn apply_transfer(
    next: &mut AggregateState,
    delta: &mut AggregateDelta,
    from: Address,
    to: Address,
    value: U256,
) {
    if from != Address::ZERO {
        let balance = next.holder_balances.get(&from).copied().unwrap_or_default();
        set_holder_balance(next, delta, from, balance.saturating_sub(value));
    }

    if to != Address::ZERO {
        let balance = next.holder_balances.get(&to).copied().unwrap_or_default();
        set_holder_balance(next, delta, to, balance.saturating_add(value));
    }
}

/// Set a holder's tracked balance, removing holders whose balance is zero
fn set_holder_balance(next: &mut AggregateState, delta: &mut AggregateDelta, holder: Address, balance: U256) {
    if balance.is_zero() {
        next.holder_balances.remove(&holder);
    } else {
        next.holder_balances.insert(holder, balance);
    }
    delta.holder_balances.insert(holder, balance);
}

/// Convert a reported amount to a signed reward
fn signed(amount: U256, block: u64) -> Result<I256, AggregationError> {
    I256::try_from(amount)
        .map_err(|_| AggregationError::decode(format!("report amount {amount} at block {block} overflows")))
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;

    use super::*;
    use crate::types::ChainId;

    /// The constants used by the aggregator tests
    fn constants() -> ProtocolConstants {
        ProtocolConstants {
            stake_target: 0.75,
            auction_max: 60,
            auction_adjust: 0.,
            max_inflation: 0.1,
            min_inflation: 0.025,
            falloff: 0.05,
            era_duration_in_blocks: 600,
            eras_per_day: 4,
            apr_min: 3.,
            apr_max: 45.,
        }
    }

    /// An event at the given position
    fn event(block_number: u64, log_index: u64, payload: EventPayload) -> EventRecord {
        EventRecord { block_number, log_index, payload }
    }

    /// An address filled with the given byte
    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    /// A mixed window of events over three blocks
    fn window() -> Vec<EventRecord> {
        vec![
            event(1, 0, EventPayload::Transfer { from: Address::ZERO, to: addr(1), value: U256::from(100u64) }),
            event(1, 1, EventPayload::Deposited { sender: addr(1), amount: U256::from(100u64) }),
            event(2, 0, EventPayload::Transfer { from: addr(1), to: addr(2), value: U256::from(40u64) }),
            event(2, 1, EventPayload::Redeemed { receiver: addr(2), amount: U256::from(10u64) }),
            event(
                3,
                0,
                EventPayload::Rewards { ledger: addr(9), rewards: U256::from(1u64), balance: U256::from(10_001u64) },
            ),
            event(
                3,
                1,
                EventPayload::Losses { ledger: addr(8), losses: U256::from(3u64), balance: U256::from(997u64) },
            ),
        ]
    }

    #[test]
    fn test_window_totals() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let applied = aggregator.apply(&AggregateState::new(ChainId::Parachain), window(), vec![])?;
        let state = applied.state;

        assert_eq!(state.buffered_deposits, U256::from(100u64));
        assert_eq!(state.deposited_count, 1);
        // nothing buffered to draw the redeem from
        assert_eq!(state.buffered_redeems, U256::ZERO);
        assert_eq!(state.redeemed, U256::from(10u64));
        assert_eq!(state.redeemed_count, 1);
        assert_eq!(state.rewards_aggregated, U256::from(1u64));
        assert_eq!(state.losses_aggregated, U256::from(3u64));
        assert_eq!(state.holder_balances.get(&addr(1)), Some(&U256::from(60u64)));
        assert_eq!(state.holder_balances.get(&addr(2)), Some(&U256::from(40u64)));
        assert_eq!(state.holders_number, 2);
        assert_eq!(state.last_block_with_events, Some(3));
        // only the 14.6% reward qualifies, the loss is below the floor
        assert!((state.apr - 14.6).abs() < 1e-9);
        assert_eq!(applied.delta.reward_rows.len(), 2);
        assert_eq!(applied.delta.reward_rows[1].reward, I256::try_from(-3i64).unwrap());
        Ok(())
    }

    #[test]
    fn test_shuffled_input_matches_sorted() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let initial = AggregateState::new(ChainId::Parachain);
        let sorted = aggregator.apply(&initial, window(), vec![])?;

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut shuffled = window();
            shuffled.shuffle(&mut rng);
            assert_eq!(aggregator.apply(&initial, shuffled, vec![])?, sorted);
        }
        Ok(())
    }

    #[test]
    fn test_delta_reproduces_state() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let mut initial = AggregateState::new(ChainId::Parachain);
        initial.holder_balances.insert(addr(1), U256::from(5u64));
        initial.holders_number = 1;
        initial.deposited = U256::from(7u64);

        let applied = aggregator.apply(&initial, window(), vec![])?;
        let mut replayed = initial.clone();
        replayed.apply_delta(&applied.delta);
        replayed.recent_rewards = applied.state.recent_rewards.clone();

        assert_eq!(replayed, applied.state);
        Ok(())
    }

    #[test]
    fn test_redeemed_draws_down_buffered_redeems() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let mut initial = AggregateState::new(ChainId::Parachain);
        initial.buffered_redeems = U256::from(50u64);
        initial.redeemed = U256::from(5u64);

        let redeem = EventPayload::Redeemed { receiver: addr(2), amount: U256::from(10u64) };
        let events = vec![event(6, 0, redeem)];
        let applied = aggregator.apply(&initial, events, vec![])?;

        assert_eq!(applied.state.buffered_redeems, U256::from(40u64));
        assert_eq!(applied.state.redeemed, U256::from(15u64));
        assert_eq!(applied.state.redeemed_count, 1);
        assert_eq!(applied.delta.counters.buffered_redeems_drawn, U256::from(10u64));

        let mut replayed = initial.clone();
        replayed.apply_delta(&applied.delta);
        assert_eq!(replayed.buffered_redeems, U256::from(40u64));
        Ok(())
    }

    #[test]
    fn test_duplicate_events_applied_once() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let deposit = event(4, 2, EventPayload::Deposited { sender: addr(1), amount: U256::from(5u64) });
        let events = vec![deposit.clone(), deposit];

        let applied = aggregator.apply(&AggregateState::new(ChainId::Parachain), events, vec![])?;
        assert_eq!(applied.state.deposited_count, 1);
        assert_eq!(applied.delta.counters.deposited, U256::from(5u64));
        Ok(())
    }

    #[test]
    fn test_untracked_sender_saturates_at_zero() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let events =
            vec![event(1, 0, EventPayload::Transfer { from: addr(3), to: addr(4), value: U256::from(50u64) })];

        let applied = aggregator.apply(&AggregateState::new(ChainId::Parachain), events, vec![])?;
        assert!(!applied.state.holder_balances.contains_key(&addr(3)));
        assert_eq!(applied.delta.holder_balances.get(&addr(3)), Some(&U256::ZERO));
        assert_eq!(applied.state.holders_number, 1);
        Ok(())
    }

    #[test]
    fn test_apr_kept_without_qualifying_reports() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 100);
        let mut initial = AggregateState::new(ChainId::Parachain);
        initial.apr = 12.;

        // 1460%, above the ceiling
        let events = vec![event(
            5,
            0,
            EventPayload::Rewards { ledger: addr(9), rewards: U256::from(100u64), balance: U256::from(10_100u64) },
        )];
        let applied = aggregator.apply(&initial, events, vec![])?;
        assert_eq!(applied.state.apr, 12.);
        Ok(())
    }

    #[test]
    fn test_stale_events_rejected() {
        let aggregator = EventAggregator::new(&constants(), 100);
        let mut initial = AggregateState::new(ChainId::Parachain);
        initial.last_block_with_events = Some(3);

        let res = aggregator.apply(&initial, window(), vec![]);
        assert!(matches!(res, Err(AggregationError::StaleEvent { block: 1, last_applied: 3 })));
    }

    #[test]
    fn test_reward_history_bounded() -> eyre::Result<()> {
        let aggregator = EventAggregator::new(&constants(), 2);
        let events = (1..=5)
            .map(|block| {
                event(
                    block,
                    0,
                    EventPayload::Rewards { ledger: addr(9), rewards: U256::from(1u64), balance: U256::from(10_001u64) },
                )
            })
            .collect();

        let applied = aggregator.apply(&AggregateState::new(ChainId::Parachain), events, vec![])?;
        let history = &applied.state.recent_rewards[&addr(9)];
        assert_eq!(history.iter().map(|r| r.block_number).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(applied.delta.reward_rows.len(), 5);
        Ok(())
    }
}
