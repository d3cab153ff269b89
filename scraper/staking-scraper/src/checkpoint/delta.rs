//! The unit of change a scan window commits to the store

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};

use crate::types::{
    AggregateState, ChainId, LedgerRecord, RelayLedgerRecord, RewardRow, ValidatorsInfo,
};

/// Counters that a window moves.
///
/// These are applied as `col = col + delta` (or `col - delta` for the redeem
/// buffer) so that loops sharing an aggregate row compose.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterIncrements {
    /// Added to the running deposit total
    pub deposited: U256,
    /// Added to the running redeem total
    pub redeemed: U256,
    /// Added to the Deposited event count
    pub deposited_count: u64,
    /// Added to the Redeemed event count
    pub redeemed_count: u64,
    /// Added to the running reward total
    pub rewards_aggregated: U256,
    /// Added to the running loss total
    pub losses_aggregated: U256,
    /// Added to the buffered deposits
    pub buffered_deposits: U256,
    /// Subtracted from the buffered redeems, saturating at zero
    pub buffered_redeems_drawn: U256,
}

impl CounterIncrements {
    /// Whether every increment is zero
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Scalars that a window overwrites, `None` leaves the stored value untouched
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarOverwrites {
    /// The nToken total supply
    pub total_supply: Option<U256>,
    /// The nToken total supply in USD
    pub total_supply_usd: Option<f64>,
    /// The buffered deposits read from the contract
    pub contract_buffered_deposits: Option<U256>,
    /// The buffered redeems read from the contract
    pub contract_buffered_redeems: Option<U256>,
    /// The OracleMaster `eraId`
    pub era_id: Option<u64>,
    /// The OracleMaster `getCurrentEraId`
    pub current_era_id: Option<u64>,
    /// The OracleMaster next era start time
    pub next_era_start_time: Option<i64>,
    /// The relay chain active era
    pub relay_active_era_id: Option<u64>,
    /// The relay chain next era start time
    pub relay_next_era_start_time: Option<i64>,
    /// The relay chain session validator count
    pub relay_validators_count: Option<u64>,
    /// The relay chain total stake of the active era
    pub relay_total_staked: Option<U256>,
    /// The relay chain total issuance
    pub relay_total_issuance: Option<U256>,
    /// The last block in which a Nimbus event was seen
    pub last_block_with_events: Option<u64>,
    /// The APR over recent reports
    pub apr: Option<f64>,
    /// The monthly APR
    pub apr_per_month: Option<f64>,
    /// The weekly APR
    pub apr_per_week: Option<f64>,
    /// The relay chain inflation rate
    pub inflation_rate: Option<f64>,
    /// The estimated staking APY
    pub estimated_apy: Option<f64>,
}

impl ScalarOverwrites {
    /// Whether no scalar is overwritten
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The changes produced by one scan window
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateDelta {
    /// The chain whose aggregate row is changed
    pub chain: ChainId,
    /// Counter increments
    pub counters: CounterIncrements,
    /// Scalar overwrites
    pub scalars: ScalarOverwrites,
    /// Absolute holder balances, a zero balance removes the holder
    pub holder_balances: BTreeMap<Address, U256>,
    /// The holder count after the window
    pub holders_number: Option<u64>,
    /// Reward rows to append
    pub reward_rows: Vec<RewardRow>,
    /// Parachain ledger records to upsert
    pub ledgers: Vec<LedgerRecord>,
    /// Relay chain ledger records to upsert
    pub relay_ledgers: Vec<RelayLedgerRecord>,
    /// A replacement for the full validators info set
    pub validators_info: Option<Vec<ValidatorsInfo>>,
}

impl AggregateDelta {
    /// Create an empty delta for the given chain
    pub fn new(chain: ChainId) -> Self {
        Self { chain, ..Default::default() }
    }
}

impl AggregateState {
    /// Apply a delta to this state, overwrites first and increments after
    pub fn apply_delta(&mut self, delta: &AggregateDelta) {
        let s = &delta.scalars;
        overwrite(&mut self.total_supply, s.total_supply);
        if s.total_supply_usd.is_some() {
            self.total_supply_usd = s.total_supply_usd;
        }
        overwrite(&mut self.contract_buffered_deposits, s.contract_buffered_deposits);
        overwrite(&mut self.contract_buffered_redeems, s.contract_buffered_redeems);
        overwrite_opt(&mut self.era_id, s.era_id);
        overwrite_opt(&mut self.current_era_id, s.current_era_id);
        overwrite_opt(&mut self.next_era_start_time, s.next_era_start_time);
        overwrite_opt(&mut self.relay.active_era_id, s.relay_active_era_id);
        overwrite_opt(&mut self.relay.next_era_start_time, s.relay_next_era_start_time);
        overwrite_opt(&mut self.relay.validators_count, s.relay_validators_count);
        overwrite(&mut self.relay.total_staked, s.relay_total_staked);
        overwrite(&mut self.relay.total_issuance, s.relay_total_issuance);
        overwrite_opt(&mut self.last_block_with_events, s.last_block_with_events);
        overwrite(&mut self.apr, s.apr);
        overwrite(&mut self.apr_per_month, s.apr_per_month);
        overwrite(&mut self.apr_per_week, s.apr_per_week);
        overwrite(&mut self.inflation_rate, s.inflation_rate);
        overwrite(&mut self.estimated_apy, s.estimated_apy);

        let c = &delta.counters;
        self.deposited = self.deposited.saturating_add(c.deposited);
        self.redeemed = self.redeemed.saturating_add(c.redeemed);
        self.deposited_count += c.deposited_count;
        self.redeemed_count += c.redeemed_count;
        self.rewards_aggregated = self.rewards_aggregated.saturating_add(c.rewards_aggregated);
        self.losses_aggregated = self.losses_aggregated.saturating_add(c.losses_aggregated);
        self.buffered_deposits = self.buffered_deposits.saturating_add(c.buffered_deposits);
        self.buffered_redeems = self.buffered_redeems.saturating_sub(c.buffered_redeems_drawn);

        for (holder, balance) in delta.holder_balances.iter() {
            if balance.is_zero() {
                self.holder_balances.remove(holder);
            } else {
                self.holder_balances.insert(*holder, *balance);
            }
        }
        if let Some(holders_number) = delta.holders_number {
            self.holders_number = holders_number;
        }

        for ledger in delta.ledgers.iter() {
            self.ledgers.insert(ledger.ledger, ledger.clone());
        }
        for ledger in delta.relay_ledgers.iter() {
            self.relay_ledgers.insert(ledger.ledger, ledger.clone());
        }
    }
}

/// Overwrite a value if a replacement is given
fn overwrite<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Overwrite an optional value if a replacement is given
fn overwrite_opt<T: Copy>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_increments_and_overwrites() {
        let mut state = AggregateState::new(ChainId::Parachain);
        state.buffered_deposits = U256::from(50u64);
        state.buffered_redeems = U256::from(50u64);

        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.scalars.contract_buffered_deposits = Some(U256::from(10u64));
        delta.counters.buffered_deposits = U256::from(5u64);
        delta.counters.buffered_redeems_drawn = U256::from(8u64);
        delta.counters.deposited = U256::from(5u64);
        delta.counters.deposited_count = 1;
        state.apply_delta(&delta);

        // The contract reading never touches the event-driven buffers
        assert_eq!(state.contract_buffered_deposits, U256::from(10u64));
        assert_eq!(state.buffered_deposits, U256::from(55u64));
        assert_eq!(state.buffered_redeems, U256::from(42u64));
        assert_eq!(state.deposited, U256::from(5u64));
        assert_eq!(state.deposited_count, 1);
    }

    #[test]
    fn test_redeem_buffer_saturates_at_zero() {
        let mut state = AggregateState::new(ChainId::Parachain);
        state.buffered_redeems = U256::from(3u64);

        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.counters.buffered_redeems_drawn = U256::from(10u64);
        state.apply_delta(&delta);

        assert_eq!(state.buffered_redeems, U256::ZERO);
    }

    #[test]
    fn test_apply_delta_zero_balance_removes_holder() {
        let holder = Address::repeat_byte(0x11);
        let mut state = AggregateState::new(ChainId::Parachain);
        state.holder_balances.insert(holder, U256::from(1u64));
        state.holders_number = 1;

        let mut delta = AggregateDelta::new(ChainId::Parachain);
        delta.holder_balances.insert(holder, U256::ZERO);
        delta.holders_number = Some(0);
        state.apply_delta(&delta);

        assert!(state.holder_balances.is_empty());
        assert_eq!(state.holders_number, 0);
    }

    #[test]
    fn test_empty_parts() {
        let delta = AggregateDelta::new(ChainId::RelayChain);
        assert!(delta.counters.is_empty());
        assert!(delta.scalars.is_empty());
    }
}
