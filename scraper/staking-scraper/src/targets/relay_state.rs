//! Snapshots the staking state of the relay chain, and derives the inflation
//! and long-horizon APR metrics from it

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    chain_reader::ChainReader,
    checkpoint::{AggregateDelta, CheckpointStore},
    metrics_engine::{
        apr_per_month, apr_per_week, inflation_rate, month_row_limit, relay_next_era_start_time,
        week_row_limit,
    },
    parachain::{
        ParachainClient,
        queries::{StashLedgersQuery, StashSource},
    },
    publisher::{GaugeValue, Publisher, labels::*},
    relay_chain::{
        RelayChainClient,
        queries::{ActiveEraQuery, RelayStakingQuery, RelayStakingSnapshot, find_era_start_block},
        types::AccountId,
    },
    scanner::{ScanOutput, ScanTarget, WindowKind, error::ScanError},
    types::{AggregateState, BlockWindow, ChainId, ProtocolConstants, RelayLedgerRecord, RewardRow, ScanTargetId},
    utils::u256_to_f64,
};

/// The payout service account
#[derive(Clone, Debug)]
pub struct PayoutAccount {
    /// The raw account id
    pub account: AccountId,
    /// The ss58 address, used as the metric label
    pub address: String,
}

/// The relay chain state loop
pub struct RelayStateTarget {
    /// The relay chain reader
    relay: Arc<ChainReader<RelayChainClient>>,
    /// The parachain reader, used to list the stash accounts
    parachain: Arc<ChainReader<ParachainClient>>,
    /// The store, read for the reward history
    store: Arc<dyn CheckpointStore>,
    /// The protocol constants
    constants: ProtocolConstants,
    /// The payout service account, if configured
    payout: Option<PayoutAccount>,
    /// The address format of the relay chain
    ss58_format: u16,
    /// The first block of the last seen active era
    era_start: Mutex<Option<(u32, u64)>>,
}

impl RelayStateTarget {
    /// Create a new relay state target
    pub fn new(
        relay: Arc<ChainReader<RelayChainClient>>,
        parachain: Arc<ChainReader<ParachainClient>>,
        store: Arc<dyn CheckpointStore>,
        constants: ProtocolConstants,
        payout: Option<PayoutAccount>,
        ss58_format: u16,
    ) -> Self {
        Self { relay, parachain, store, constants, payout, ss58_format, era_start: Mutex::new(None) }
    }

    /// The first block of the given era, searched for backwards from `head`
    /// at most one era's length
    async fn era_start_block(&self, era: u32, head: u64) -> Result<u64, ScanError> {
        let cached = *self.era_start.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_era, block)) = cached {
            if cached_era == era {
                return Ok(block);
            }
        }

        let relay = self.relay.as_ref();
        let query = &ActiveEraQuery;
        let low = head.saturating_sub(self.constants.era_duration_in_blocks);
        let block = find_era_start_block(era, low, head, move |block| async move {
            relay.fetch_contract_state(query, block).await
        })
        .await?;

        debug!(era, block, "found active era start block");
        *self.era_start.lock().unwrap_or_else(PoisonError::into_inner) = Some((era, block));
        Ok(block)
    }
}

#[async_trait]
impl ScanTarget for RelayStateTarget {
    fn id(&self) -> ScanTargetId {
        ScanTargetId::RelayState
    }

    fn chain(&self) -> ChainId {
        ChainId::RelayChain
    }

    fn window_kind(&self) -> WindowKind {
        WindowKind::Snapshot
    }

    async fn current_height(&self) -> Result<u64, ScanError> {
        Ok(self.relay.current_height().await?)
    }

    async fn scan(&self, window: BlockWindow, state: &AggregateState) -> Result<ScanOutput, ScanError> {
        let para_height = self.parachain.current_height().await?;
        let stashes = self
            .parachain
            .fetch_contract_state(&StashLedgersQuery { source: StashSource::OracleMaster }, para_height)
            .await?;

        let query = RelayStakingQuery {
            stashes,
            payout_account: self.payout.as_ref().map(|p| p.account),
            ss58_format: self.ss58_format,
        };
        let snapshot = self.relay.fetch_contract_state(&query, window.to).await?;
        info!(block = window.to, ledgers = snapshot.ledgers.len(), "read relay chain snapshot");

        let era_start = match snapshot.active_era {
            Some(era) => Some(self.era_start_block(era.index, window.to).await?),
            None => None,
        };

        let month_rows = self.store.query_recent_rewards(month_row_limit(&self.constants)).await?;
        let week_rows = self.store.query_recent_rewards(week_row_limit(&self.constants)).await?;

        Ok(relay_output(
            &self.constants,
            state,
            snapshot,
            era_start,
            &RecentRewards { month: month_rows, week: week_rows },
            self.payout.as_ref().map(|p| p.address.as_str()),
        ))
    }

    fn publish(&self, state: &AggregateState, _window: BlockWindow, publisher: &Publisher) {
        if let Some(era) = state.relay.active_era_id {
            publisher.set_gauge(RELAY_CHAIN_ACTIVE_ERA_ID, era as f64);
        }
        if let Some(start) = state.relay.next_era_start_time {
            publisher.set_gauge(RELAY_CHAIN_NEXT_ERA_START_TIME, start as f64);
        }
        publisher.set_amount(RELAY_CHAIN_TOTAL_STAKED_TOKENS, state.relay.total_staked);
        publisher.set_gauge(INFLATION_RATE, state.inflation_rate);
        publisher.set_gauge(ESTIMATED_APY, state.estimated_apy);
        publisher.set_gauge(APR_PER_MONTH, state.apr_per_month);
        publisher.set_gauge(APR_PER_WEEK, state.apr_per_week);

        for record in state.relay_ledgers.values() {
            publish_relay_ledger(publisher, record);
        }
    }
}

// -----------
// | Helpers |
// -----------

/// The reward history the long-horizon APRs are averaged over
pub struct RecentRewards {
    /// A month of reward rows per ledger
    pub month: Vec<RewardRow>,
    /// A week of reward rows per ledger
    pub week: Vec<RewardRow>,
}

/// Turn a relay chain snapshot into the delta, candidate state and gauges of
/// one window
pub fn relay_output(
    constants: &ProtocolConstants,
    state: &AggregateState,
    snapshot: RelayStakingSnapshot,
    era_start_block: Option<u64>,
    rewards: &RecentRewards,
    payout_address: Option<&str>,
) -> ScanOutput {
    let inflation = inflation_rate(
        constants,
        snapshot.auction_counter,
        snapshot.total_staked,
        snapshot.total_issuance,
    );

    let mut delta = AggregateDelta::new(ChainId::RelayChain);
    let scalars = &mut delta.scalars;
    scalars.relay_active_era_id = snapshot.active_era.map(|era| u64::from(era.index));
    scalars.relay_next_era_start_time = era_start_block.map(|start| {
        relay_next_era_start_time(
            constants.era_duration_in_blocks,
            snapshot.block_number,
            start,
            snapshot.timestamp_secs,
        )
    });
    scalars.relay_validators_count = Some(snapshot.session_validators.len() as u64);
    scalars.relay_total_staked = Some(snapshot.total_staked);
    scalars.relay_total_issuance = Some(snapshot.total_issuance);
    scalars.inflation_rate = Some(inflation.inflation);
    scalars.estimated_apy = Some(inflation.estimated_apy);
    scalars.apr_per_month = Some(apr_per_month(&rewards.month, constants));
    scalars.apr_per_week = Some(apr_per_week(&rewards.week, constants));
    delta.relay_ledgers = snapshot.ledgers;

    let mut next = state.clone();
    next.apply_delta(&delta);

    let mut output = ScanOutput::new(next, delta);
    if let (Some(address), Some(balance)) = (payout_address, snapshot.payout_balance) {
        output.gauges.push(GaugeValue::labeled_amount(PAYOUT_SERVICE_BALANCE, ADDRESS_TAG, address, balance));
    }

    output
}

/// Publish the per-ledger gauges of a relay chain ledger
fn publish_relay_ledger(publisher: &Publisher, record: &RelayLedgerRecord) {
    let ledger = record.ledger.to_string();
    let fields = [
        ("active_balance", u256_to_f64(record.active_balance)),
        ("total_balance", u256_to_f64(record.total_balance)),
        ("stash_balance", u256_to_f64(record.stash_balance)),
        ("stake_status", f64::from(record.stake_status.code())),
        ("total_unlocking_balance", u256_to_f64(record.total_unlocking_balance)),
        ("earliest_era_for_unlocking", record.earliest_era_for_unlocking as f64),
    ];

    for (field, value) in fields {
        let name = format!("{RELAY_CHAIN_LEDGER_PREFIX}{field}");
        publisher.set_labeled_gauge(&name, LEDGER_TAG, &ledger, value);
    }
    publisher.set_labeled_gauge(VALIDATORS_COUNT, LEDGER_TAG, &ledger, record.validators_count as f64);
}
