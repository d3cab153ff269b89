//! Derived staking metrics: inflation, APR and era timing.
//!
//! Every function here is pure; the scan targets feed them chain state and
//! publish the results.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};

use crate::{
    types::{ProtocolConstants, RewardRow},
    utils::{i256_to_f64, u256_to_f64},
};

/// The relay chain's block time in seconds
pub const RELAY_BLOCK_TIME_SECS: i64 = 6;
/// The offset the oracles wait after an era boundary before reporting
pub const ORACLE_REPORT_DELAY_SECS: i64 = 600;
/// The number of days in a year
const DAYS_PER_YEAR: f64 = 365.;

/// The result of the inflation model
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InflationOutput {
    /// The fraction of the issuance that is staked
    pub staked_fraction: f64,
    /// The yearly inflation rate
    pub inflation: f64,
    /// The estimated yearly return of staking
    pub estimated_apy: f64,
}

// -------------
// | Inflation |
// -------------

/// Compute the relay chain's inflation and the resulting staking APY
pub fn inflation_rate(
    constants: &ProtocolConstants,
    num_auctions: u32,
    total_staked: U256,
    total_issuance: U256,
) -> InflationOutput {
    let staked_fraction = if total_staked.is_zero() || total_issuance.is_zero() {
        0.
    } else {
        u256_to_f64(total_staked) / u256_to_f64(total_issuance)
    };

    let auctions = f64::from(constants.auction_max.min(num_auctions));
    let ideal_stake = constants.stake_target - auctions * constants.auction_adjust;
    if ideal_stake <= 0. {
        return InflationOutput { staked_fraction, inflation: constants.min_inflation, estimated_apy: 0. };
    }

    let ideal_interest = constants.max_inflation / ideal_stake;
    let inflation = if staked_fraction <= ideal_stake {
        constants.min_inflation
            + staked_fraction * (ideal_interest - constants.min_inflation / ideal_stake)
    } else {
        constants.min_inflation
            + (ideal_interest * ideal_stake - constants.min_inflation)
                * 2f64.powf((ideal_stake - staked_fraction) / constants.falloff)
    };
    let inflation = inflation.clamp(constants.min_inflation, constants.max_inflation);

    let estimated_apy = if staked_fraction == 0. { 0. } else { inflation / staked_fraction };
    InflationOutput { staked_fraction, inflation, estimated_apy }
}

// -------
// | APR |
// -------

/// The annualized return of one ledger report, in percent
pub fn era_apr(row: &RewardRow, eras_per_day: u64) -> f64 {
    let reward = i256_to_f64(row.reward);
    let principal = u256_to_f64(row.balance) - reward;
    if principal == 0. {
        return 0.;
    }

    reward / principal * eras_per_day as f64 * DAYS_PER_YEAR * 100.
}

/// Average the per-report APR within `[apr_min, apr_max]`, first per ledger
/// and then across ledgers. Returns `previous` when no report qualifies.
pub fn average_apr<'a, I>(previous: f64, rows: I, eras_per_day: u64, apr_min: f64, apr_max: f64) -> f64
where
    I: IntoIterator<Item = &'a RewardRow>,
{
    let mut per_ledger: BTreeMap<Address, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let apr = era_apr(row, eras_per_day);
        if !(apr_min..=apr_max).contains(&apr) {
            continue;
        }

        let entry = per_ledger.entry(row.ledger).or_insert((0., 0));
        entry.0 += apr;
        entry.1 += 1;
    }

    if per_ledger.is_empty() {
        return previous;
    }

    let sum: f64 = per_ledger.values().map(|(sum, count)| sum / *count as f64).sum();
    sum / per_ledger.len() as f64
}

/// The monthly APR over the given reward rows
pub fn apr_per_month(rows: &[RewardRow], constants: &ProtocolConstants) -> f64 {
    average_apr(0., rows, constants.eras_per_day, constants.apr_min, constants.apr_max) / 12.
}

/// The weekly APR over the given reward rows
pub fn apr_per_week(rows: &[RewardRow], constants: &ProtocolConstants) -> f64 {
    average_apr(0., rows, constants.eras_per_day, constants.apr_min, constants.apr_max) / 52.
}

/// The number of reward rows per ledger covering a month of eras
pub fn month_row_limit(constants: &ProtocolConstants) -> usize {
    (constants.eras_per_day * 30) as usize
}

/// The number of reward rows per ledger covering a week of eras
pub fn week_row_limit(constants: &ProtocolConstants) -> usize {
    (constants.eras_per_day * 7) as usize
}

// --------------
// | Era Timing |
// --------------

/// The unix time at which the relay chain's next era starts
pub fn relay_next_era_start_time(
    era_duration_in_blocks: u64,
    block: u64,
    active_era_start_block: u64,
    block_timestamp_secs: u64,
) -> i64 {
    let elapsed = block as i64 - active_era_start_block as i64;
    (era_duration_in_blocks as i64 - elapsed) * RELAY_BLOCK_TIME_SECS + block_timestamp_secs as i64
}

/// The unix time at which the OracleMaster's next era starts
pub fn oracle_next_era_start_time(
    era_id: u64,
    anchor_era_id: u64,
    seconds_per_era: u64,
    anchor_timestamp: u64,
) -> i64 {
    let eras = era_id as i64 + 1 - anchor_era_id as i64;
    eras * seconds_per_era as i64 + ORACLE_REPORT_DELAY_SECS + anchor_timestamp as i64
}

/// The total supply valued at the given token price
pub fn total_supply_usd(total_supply: U256, price: Option<f64>) -> Option<f64> {
    price.map(|price| u256_to_f64(total_supply) * price)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::I256;
    use proptest::prelude::*;

    use super::*;

    /// Constants mirroring a Kusama-like configuration
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

    /// A reward row of the given ledger
    fn row(ledger: u8, reward: i64, balance: u64, block: u64) -> RewardRow {
        RewardRow {
            ledger: Address::repeat_byte(ledger),
            reward: I256::try_from(reward).unwrap(),
            balance: U256::from(balance),
            block_number: block,
        }
    }

    /// Inflation at a staked fraction expressed in parts per million
    fn inflation_at(ppm: u64) -> InflationOutput {
        inflation_rate(&constants(), 0, U256::from(ppm), U256::from(1_000_000u64))
    }

    #[test]
    fn test_zero_staked_fraction() {
        let out = inflation_rate(&constants(), 0, U256::ZERO, U256::from(100u64));
        assert_eq!(out.staked_fraction, 0.);
        assert_eq!(out.inflation, constants().min_inflation);
        assert_eq!(out.estimated_apy, 0.);

        let out = inflation_rate(&constants(), 0, U256::from(100u64), U256::ZERO);
        assert_eq!(out.staked_fraction, 0.);
    }

    #[test]
    fn test_continuous_at_ideal_stake() {
        let below = inflation_at(749_999).inflation;
        let at = inflation_at(750_000).inflation;
        let above = inflation_at(750_001).inflation;

        assert!((at - constants().max_inflation).abs() < 1e-9);
        assert!((below - at).abs() < 1e-5);
        assert!((above - at).abs() < 1e-5);
    }

    #[test]
    fn test_auctions_lower_ideal_stake() {
        let mut c = constants();
        c.auction_adjust = 0.003;
        let with_auctions = inflation_rate(&c, 10, U256::from(720_000u64), U256::from(1_000_000u64));
        // ideal stake is 0.72, so this fraction sits on the peak
        assert!((with_auctions.inflation - c.max_inflation).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_ideal_stake_yields_min_inflation() {
        let mut c = constants();
        c.auction_adjust = 1.;
        let out = inflation_rate(&c, 5, U256::from(1u64), U256::from(2u64));
        assert_eq!(out.inflation, c.min_inflation);
    }

    proptest! {
        #[test]
        fn prop_inflation_within_bounds(ppm in 0u64..=1_000_000u64) {
            let out = inflation_at(ppm);
            prop_assert!(out.inflation >= constants().min_inflation);
            prop_assert!(out.inflation <= constants().max_inflation);
            prop_assert!(out.estimated_apy >= 0.);
        }
    }

    #[test]
    fn test_era_apr() {
        // 10 on a principal of 10_000 at 4 eras a day
        let apr = era_apr(&row(1, 10, 10_010, 1), 4);
        assert!((apr - 146.).abs() < 1e-9);

        assert_eq!(era_apr(&row(1, 10, 10, 1), 4), 0.);
    }

    #[test]
    fn test_average_apr_filters_and_averages_per_ledger() {
        let rows = vec![
            // ledger 1: 14.6% and 29.2%
            row(1, 1, 10_001, 1),
            row(1, 2, 10_002, 2),
            // ledger 2: 7.3%
            row(2, 1, 20_001, 1),
            // above the ceiling
            row(3, 100, 10_100, 1),
            // a loss, below the floor
            row(2, -5, 9_995, 3),
        ];

        let apr = average_apr(0., &rows, 4, 3., 45.);
        let expected = ((14.6 + 29.2) / 2. + 7.3) / 2.;
        assert!((apr - expected).abs() < 1e-9);
    }

    #[test]
    fn test_average_apr_keeps_previous_without_qualifying_rows() {
        let rows = vec![row(1, 100, 10_100, 1)];
        assert_eq!(average_apr(11.5, &rows, 4, 3., 45.), 11.5);
        assert_eq!(average_apr(11.5, &[], 4, 3., 45.), 11.5);
    }

    #[test]
    fn test_month_and_week_scaling() {
        let rows = vec![row(1, 1, 10_001, 1)];
        assert!((apr_per_month(&rows, &constants()) - 14.6 / 12.).abs() < 1e-9);
        assert!((apr_per_week(&rows, &constants()) - 14.6 / 52.).abs() < 1e-9);
        assert_eq!(month_row_limit(&constants()), 120);
        assert_eq!(week_row_limit(&constants()), 28);
    }

    #[test]
    fn test_relay_next_era_start_time() {
        // 100 blocks into a 600 block era
        assert_eq!(relay_next_era_start_time(600, 1_100, 1_000, 1_700_000_000), 1_700_003_000);
        // overdue era
        assert_eq!(relay_next_era_start_time(600, 1_700, 1_000, 1_700_000_000), 1_699_999_400);
    }

    #[test]
    fn test_oracle_next_era_start_time() {
        assert_eq!(oracle_next_era_start_time(10, 0, 21_600, 1_600_000_000), 1_600_238_200);
    }

    #[test]
    fn test_total_supply_usd() {
        let supply = U256::from(2_000u64);
        assert_eq!(total_supply_usd(supply, Some(1.5)), Some(3_000.));
        assert_eq!(total_supply_usd(supply, None), None);
    }
}
