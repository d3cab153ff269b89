//! Scans the Nimbus event log of the parachain

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    aggregator::EventAggregator,
    chain_reader::{ChainReader, LogSource},
    checkpoint::CheckpointStore,
    publisher::{Publisher, labels::*},
    scanner::{ScanOutput, ScanTarget, WindowKind, error::ScanError},
    types::{AggregateState, BlockWindow, ChainId, ScanTargetId},
};

/// The parachain events loop
pub struct EventsTarget<C> {
    /// The parachain reader
    reader: Arc<ChainReader<C>>,
    /// The event fold
    aggregator: EventAggregator,
    /// The store, read to restore the reward history
    store: Arc<dyn CheckpointStore>,
    /// The first block to scan
    initial_block: u64,
}

impl<C> EventsTarget<C> {
    /// Create a new events target
    pub fn new(
        reader: Arc<ChainReader<C>>,
        aggregator: EventAggregator,
        store: Arc<dyn CheckpointStore>,
        initial_block: u64,
    ) -> Self {
        Self { reader, aggregator, store, initial_block }
    }
}

#[async_trait]
impl<C: LogSource> ScanTarget for EventsTarget<C> {
    fn id(&self) -> ScanTargetId {
        ScanTargetId::Events
    }

    fn chain(&self) -> ChainId {
        self.reader.chain()
    }

    fn window_kind(&self) -> WindowKind {
        WindowKind::Ranged
    }

    fn initial_cursor(&self) -> u64 {
        self.initial_block.saturating_sub(1)
    }

    async fn current_height(&self) -> Result<u64, ScanError> {
        Ok(self.reader.current_height().await?)
    }

    async fn hydrate(&self, state: &mut AggregateState) -> Result<(), ScanError> {
        let rows = self.store.query_recent_rewards(self.aggregator.history_limit()).await?;
        info!(rows = rows.len(), "restored reward history");
        state.hydrate_recent_rewards(rows);
        Ok(())
    }

    async fn scan(&self, window: BlockWindow, state: &AggregateState) -> Result<ScanOutput, ScanError> {
        let events = self.reader.fetch_events(window).await?;
        if !events.is_empty() {
            info!(chain = %self.chain(), from = window.from, to = window.to, events = events.len(), "read events");
        }

        let applied = self.aggregator.apply(state, events, Vec::new())?;
        Ok(ScanOutput::new(applied.state, applied.delta))
    }

    fn publish(&self, state: &AggregateState, window: BlockWindow, publisher: &Publisher) {
        publisher.set_gauge(PARACHAIN_BLOCK_NUMBER, window.to as f64);
        if let Some(block) = state.last_block_with_events {
            publisher.set_gauge(PARACHAIN_LAST_BLOCK_NUMBER_WITH_EVENTS, block as f64);
        }

        publisher.set_gauge(APR, state.apr);
        publisher.set_gauge(HOLDERS_NUMBER, state.holders_number as f64);
        publisher.set_amount(NIMBUS_DEPOSITS, state.deposited);
        publisher.set_amount(NIMBUS_REDEEMS, state.redeemed);
        publisher.set_gauge(NIMBUS_DEPOSITED_EVENTS_NUMBER, state.deposited_count as f64);
        publisher.set_gauge(NIMBUS_REDEEMED_EVENTS_NUMBER, state.redeemed_count as f64);
        publisher.set_amount(NIMBUS_REWARDS_AGGREGATED, state.rewards_aggregated);
        publisher.set_amount(NIMBUS_LOSSES_AGGREGATED, state.losses_aggregated);
    }
}
