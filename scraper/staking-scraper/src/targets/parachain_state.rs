//! Snapshots the contract state of the parachain

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    aggregator::{EventAggregator, error::AggregationError},
    chain_reader::ChainReader,
    db::error::DbError,
    metrics_engine::{oracle_next_era_start_time, total_supply_usd},
    parachain::{
        ParachainClient,
        queries::{ParachainSnapshot, ParachainSnapshotQuery},
    },
    publisher::{GaugeValue, Publisher, labels::*},
    scanner::{ScanOutput, ScanTarget, WindowKind, error::ScanError},
    types::{AggregateState, BlockWindow, ChainId, LedgerRecord, ScanTargetId},
    utils::u256_to_f64,
};

/// A source of the daily token price
#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    /// The token price on the given day, if one was collected
    async fn price(&self, date: NaiveDate) -> Result<Option<f64>, DbError>;
}

/// The parachain state loop
pub struct ParachainStateTarget {
    /// The parachain reader
    reader: Arc<ChainReader<ParachainClient>>,
    /// Folds ledger snapshots into the state
    aggregator: EventAggregator,
    /// The token price source, if configured
    prices: Option<Arc<dyn TokenPriceSource>>,
}

impl ParachainStateTarget {
    /// Create a new parachain state target
    pub fn new(
        reader: Arc<ChainReader<ParachainClient>>,
        aggregator: EventAggregator,
        prices: Option<Arc<dyn TokenPriceSource>>,
    ) -> Self {
        Self { reader, aggregator, prices }
    }
}

#[async_trait]
impl ScanTarget for ParachainStateTarget {
    fn id(&self) -> ScanTargetId {
        ScanTargetId::ParachainState
    }

    fn chain(&self) -> ChainId {
        ChainId::Parachain
    }

    fn window_kind(&self) -> WindowKind {
        WindowKind::Snapshot
    }

    async fn current_height(&self) -> Result<u64, ScanError> {
        Ok(self.reader.current_height().await?)
    }

    async fn scan(&self, window: BlockWindow, state: &AggregateState) -> Result<ScanOutput, ScanError> {
        let snapshot = self.reader.fetch_contract_state(&ParachainSnapshotQuery, window.to).await?;
        info!(block = window.to, ledgers = snapshot.ledgers.len(), "read parachain snapshot");

        let price = match &self.prices {
            Some(source) => lookup_price(source.as_ref(), Utc::now().date_naive()).await,
            None => None,
        };

        let mut output = snapshot_output(&self.aggregator, state, snapshot, price)?;
        if self.prices.is_some() {
            let alert = if price.is_none() { 1. } else { 0. };
            output.gauges.push(GaugeValue::new(ALERT_TOKEN_PRICE_IS_NONE, alert));
        }

        Ok(output)
    }

    fn publish(&self, state: &AggregateState, _window: BlockWindow, publisher: &Publisher) {
        publisher.set_amount(NIMBUS_TOTAL_SUPPLY, state.total_supply);
        if let Some(usd) = state.total_supply_usd {
            publisher.set_gauge(NIMBUS_TOTAL_SUPPLY_USD, usd);
        }
        publisher.set_amount(NIMBUS_BUFFERED_DEPOSITS, state.contract_buffered_deposits);
        publisher.set_amount(NIMBUS_BUFFERED_REDEEMS, state.contract_buffered_redeems);

        if let Some(era_id) = state.era_id {
            publisher.set_gauge(ORACLE_MASTER_ERA_ID, era_id as f64);
        }
        if let Some(current_era_id) = state.current_era_id {
            publisher.set_gauge(ORACLE_MASTER_CURRENT_ERA_ID, current_era_id as f64);
        }
        if let Some(start) = state.next_era_start_time {
            publisher.set_gauge(ORACLE_MASTER_NEXT_ERA_START_TIME, start as f64);
        }

        let mut ledgers_stake = U256::ZERO;
        for record in state.ledgers.values() {
            publish_ledger(publisher, record);
            ledgers_stake = ledgers_stake.saturating_add(record.stake);
        }
        publisher.set_amount(PARACHAIN_LEDGERS_STAKE, ledgers_stake);
    }
}

// -----------
// | Helpers |
// -----------

/// Look up the day's token price, logging a missing or unreadable price
pub async fn lookup_price(source: &dyn TokenPriceSource, date: NaiveDate) -> Option<f64> {
    match source.price(date).await {
        Ok(Some(price)) => {
            info!(%date, price, "read token price");
            Some(price)
        },
        Ok(None) => {
            warn!(%date, "no token price collected, retrying at the next snapshot");
            None
        },
        Err(e) => {
            warn!(%date, "failed to read token price: {e}");
            None
        },
    }
}

/// Turn a parachain snapshot into the delta, candidate state and gauges of one
/// window
pub fn snapshot_output(
    aggregator: &EventAggregator,
    state: &AggregateState,
    snapshot: ParachainSnapshot,
    price: Option<f64>,
) -> Result<ScanOutput, AggregationError> {
    let ParachainSnapshot {
        total_supply,
        nimbus_tokens,
        buffered_deposits,
        buffered_redeems,
        ledgers,
        oracle_balances,
        oracle_era,
        controller_balance,
        withdrawal,
    } = snapshot;

    let mut delta = aggregator.apply(state, Vec::new(), ledgers)?.delta;
    let scalars = &mut delta.scalars;
    scalars.total_supply = Some(total_supply);
    scalars.total_supply_usd = total_supply_usd(total_supply, price);
    scalars.contract_buffered_deposits = Some(buffered_deposits);
    scalars.contract_buffered_redeems = Some(buffered_redeems);
    scalars.era_id = Some(oracle_era.era_id);
    scalars.current_era_id = Some(oracle_era.current_era_id);
    scalars.next_era_start_time = Some(oracle_next_era_start_time(
        oracle_era.current_era_id,
        oracle_era.anchor_era_id,
        oracle_era.seconds_per_era,
        oracle_era.anchor_timestamp,
    ));

    let mut next = state.clone();
    next.apply_delta(&delta);

    let mut output = ScanOutput::new(next, delta);
    output.gauges.push(GaugeValue::amount(NIMBUS_TOKENS, nimbus_tokens));
    output.gauges.push(GaugeValue::amount(CONTROLLER_BALANCE, controller_balance));
    for (oracle, balance) in oracle_balances {
        output.gauges.push(GaugeValue::labeled_amount(
            ORACLE_SERVICE_BALANCE,
            ADDRESS_TAG,
            &oracle.to_string(),
            balance,
        ));
    }
    output.gauges.extend([
        GaugeValue::amount(WITHDRAWAL_TOKENS, withdrawal.tokens),
        GaugeValue::amount(WITHDRAWAL_PENDING_FOR_CLAIMING, withdrawal.pending_for_claiming),
        GaugeValue::amount(WITHDRAWAL_TOTAL_VIRTUAL_XCTOKEN_AMOUNT, withdrawal.total_virtual_xctoken_amount),
        GaugeValue::amount(WITHDRAWAL_TOTAL_XCTOKEN_POOL_SHARES, withdrawal.total_xctoken_pool_shares),
    ]);

    Ok(output)
}

/// Publish the per-ledger gauges of a parachain ledger
fn publish_ledger(publisher: &Publisher, record: &LedgerRecord) {
    let ledger = record.ledger.to_string();
    let fields = [
        ("active_balance", u256_to_f64(record.active_balance)),
        ("cached_total_balance", u256_to_f64(record.cached_total_balance)),
        ("locked_balance", u256_to_f64(record.locked_balance)),
        ("status", f64::from(record.status.code())),
        ("total_balance", u256_to_f64(record.total_balance)),
        ("transfer_downward_balance", u256_to_f64(record.transfer_downward_balance)),
        ("transfer_upward_balance", u256_to_f64(record.transfer_upward_balance)),
        ("stake", u256_to_f64(record.stake)),
        ("borrow", u256_to_f64(record.borrow)),
        ("xctoken_balance", u256_to_f64(record.xctoken_balance)),
    ];

    for (field, value) in fields {
        let name = format!("{PARACHAIN_LEDGER_PREFIX}{field}");
        publisher.set_labeled_gauge(&name, LEDGER_TAG, &ledger, value);
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::{
        parachain::queries::{OracleEra, WithdrawalSnapshot},
        publisher::render_key,
        types::{LedgerStatus, ProtocolConstants},
    };

    /// The aggregator used by the snapshot tests
    fn aggregator() -> EventAggregator {
        let constants = ProtocolConstants {
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
        };
        EventAggregator::new(&constants, 100)
    }

    /// A snapshot with one ledger and one oracle member
    fn snapshot() -> ParachainSnapshot {
        ParachainSnapshot {
            total_supply: U256::from(1_000u64),
            nimbus_tokens: U256::from(7u64),
            buffered_deposits: U256::from(40u64),
            buffered_redeems: U256::from(15u64),
            ledgers: vec![LedgerRecord {
                ledger: Address::repeat_byte(1),
                stake: U256::from(500u64),
                status: LedgerStatus::Nominator,
                ..Default::default()
            }],
            oracle_balances: vec![(Address::repeat_byte(2), U256::from(3u64))],
            oracle_era: OracleEra {
                anchor_era_id: 10,
                anchor_timestamp: 1_000,
                seconds_per_era: 100,
                current_era_id: 12,
                era_id: 11,
            },
            controller_balance: U256::from(9u64),
            withdrawal: WithdrawalSnapshot::default(),
        }
    }

    /// A price source returning a fixed result
    struct FixedPrice(Result<Option<f64>, ()>);

    #[async_trait]
    impl TokenPriceSource for FixedPrice {
        async fn price(&self, _date: NaiveDate) -> Result<Option<f64>, DbError> {
            self.0.map_err(|()| DbError::query("relation does not exist"))
        }
    }

    #[test]
    fn test_snapshot_overwrites_scalars() {
        let mut state = AggregateState::new(ChainId::Parachain);
        state.deposited_count = 4;
        state.buffered_deposits = U256::from(999u64);

        let output = snapshot_output(&aggregator(), &state, snapshot(), Some(2.)).unwrap();
        let next = &output.state;

        assert_eq!(next.contract_buffered_deposits, U256::from(40u64));
        assert_eq!(next.contract_buffered_redeems, U256::from(15u64));
        // the event-driven buffer belongs to the events loop
        assert_eq!(next.buffered_deposits, U256::from(999u64));
        assert_eq!(next.total_supply_usd, Some(2_000.));
        assert_eq!(next.era_id, Some(11));
        assert_eq!(next.current_era_id, Some(12));
        // (12 + 1 - 10) * 100 + 600 + 1000
        assert_eq!(next.next_era_start_time, Some(1_900));
        assert_eq!(next.deposited_count, 4);
        assert!(output.delta.counters.is_empty());
        assert_eq!(next.ledgers[&Address::repeat_byte(1)].stake, U256::from(500u64));
    }

    #[test]
    fn test_snapshot_without_price_keeps_usd() {
        let mut state = AggregateState::new(ChainId::Parachain);
        state.total_supply_usd = Some(5.);

        let output = snapshot_output(&aggregator(), &state, snapshot(), None).unwrap();
        assert_eq!(output.delta.scalars.total_supply_usd, None);
        assert_eq!(output.state.total_supply_usd, Some(5.));
    }

    #[test]
    fn test_snapshot_gauges() {
        let state = AggregateState::new(ChainId::Parachain);
        let output = snapshot_output(&aggregator(), &state, snapshot(), None).unwrap();

        let publisher = Publisher::new("");
        publisher.publish_all(&output.gauges);
        let oracle = Address::repeat_byte(2).to_string();
        assert_eq!(publisher.get(NIMBUS_TOKENS), Some(7.));
        assert_eq!(publisher.get(CONTROLLER_BALANCE), Some(9.));
        assert_eq!(publisher.get(&render_key(ORACLE_SERVICE_BALANCE, ADDRESS_TAG, &oracle)), Some(3.));
        assert_eq!(publisher.get(WITHDRAWAL_TOKENS), Some(0.));
    }

    #[test]
    fn test_publish_ledger_metrics() {
        let state = AggregateState::new(ChainId::Parachain);
        let output = snapshot_output(&aggregator(), &state, snapshot(), None).unwrap();

        let publisher = Publisher::new("");
        for record in output.state.ledgers.values() {
            publish_ledger(&publisher, record);
        }
        let ledger = Address::repeat_byte(1).to_string();
        assert_eq!(publisher.get(&render_key("parachain_ledger_stake", LEDGER_TAG, &ledger)), Some(500.));
        assert_eq!(publisher.get(&render_key("parachain_ledger_status", LEDGER_TAG, &ledger)), Some(1.));
    }

    #[tokio::test]
    async fn test_lookup_price() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(lookup_price(&FixedPrice(Ok(Some(1.5))), date).await, Some(1.5));
        assert_eq!(lookup_price(&FixedPrice(Ok(None)), date).await, None);
        assert_eq!(lookup_price(&FixedPrice(Err(())), date).await, None);
    }
}
