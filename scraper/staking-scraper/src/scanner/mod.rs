//! Drives one scan loop: pulls block windows through a scan target, commits
//! the result with the cursor, and publishes the target's metrics.
//!
//! A loop moves `Idle -> Scanning -> Committing -> Idle`, and from any phase to
//! `Failed`, which returns to `Idle` after a backoff. Failed windows are
//! retried from the same cursor, so no window is ever skipped.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    checkpoint::{AggregateDelta, CheckpointStore, CommitOutcome},
    publisher::{GaugeValue, Publisher, labels::ALERT_NOT_CONNECTED_PREFIX},
    scanner::error::{Recovery, ScanError},
    types::{AggregateState, BlockWindow, ChainId, ScanCursor, ScanTargetId},
};

pub mod error;

/// The largest share of a backoff added as jitter
const BACKOFF_JITTER: f64 = 0.1;

// ---------
// | Types |
// ---------

/// How a target chooses its windows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowKind {
    /// Consecutive block ranges after the cursor
    Ranged,
    /// A single snapshot of the newest finalized block
    Snapshot,
}

/// The phase of a scan loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerPhase {
    /// Waiting for the chain to advance past the cursor
    Idle,
    /// Reading and folding a window
    Scanning(BlockWindow),
    /// Committing a window's delta with its cursor
    Committing(BlockWindow),
    /// Backing off after a failed window
    Failed,
}

/// The result of scanning a window
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutput {
    /// The state after the window
    pub state: AggregateState,
    /// The changes the window makes to the stored state
    pub delta: AggregateDelta,
    /// Values read during the window that are published but not stored
    pub gauges: Vec<GaugeValue>,
}

impl ScanOutput {
    /// An output without extra gauge values
    pub fn new(state: AggregateState, delta: AggregateDelta) -> Self {
        Self { state, delta, gauges: Vec::new() }
    }
}

/// The result of one scanner step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The cursor is at the chain head
    UpToDate,
    /// The window was committed
    Committed(BlockWindow),
    /// Another writer had already committed the window
    AlreadyApplied(BlockWindow),
    /// The step was cancelled before committing
    Cancelled,
}

/// Tunables of a scan loop
#[derive(Clone, Copy, Debug)]
pub struct ScannerConfig {
    /// The largest window a ranged target scans at once
    pub max_range: u64,
    /// The sleep between height polls when the cursor is at the head
    pub poll_interval: Duration,
    /// The first backoff after a failure
    pub base_backoff: Duration,
    /// The largest backoff
    pub max_backoff: Duration,
}

// --------------------
// | Trait Definition |
// --------------------

/// The chain-specific half of a scan loop
#[async_trait]
pub trait ScanTarget: Send + Sync {
    /// The id of the loop
    fn id(&self) -> ScanTargetId;

    /// The chain the loop reads
    fn chain(&self) -> ChainId;

    /// How the loop chooses its windows
    fn window_kind(&self) -> WindowKind;

    /// The cursor used before the loop's first commit
    fn initial_cursor(&self) -> u64 {
        0
    }

    /// The minimum time between two windows
    fn throttle(&self) -> Option<Duration> {
        None
    }

    /// The latest finalized block
    async fn current_height(&self) -> Result<u64, ScanError>;

    /// Fill in state that is not part of the stored aggregate row
    async fn hydrate(&self, _state: &mut AggregateState) -> Result<(), ScanError> {
        Ok(())
    }

    /// Read and fold a window
    async fn scan(&self, window: BlockWindow, state: &AggregateState) -> Result<ScanOutput, ScanError>;

    /// Publish the metrics of a committed window
    fn publish(&self, state: &AggregateState, window: BlockWindow, publisher: &Publisher);
}

// -----------------
// | Block Scanner |
// -----------------

/// A scan loop over one target
pub struct BlockScanner<T, S> {
    /// The chain-specific half of the loop
    target: T,
    /// The durable store of cursors and aggregates
    store: S,
    /// The gauge registry
    publisher: Arc<Publisher>,
    /// Tunables
    config: ScannerConfig,
    /// The last committed block
    cursor: u64,
    /// The state as of the cursor
    state: AggregateState,
    /// The current window size of ranged targets
    range: u64,
    /// The number of consecutive failures
    failures: u32,
    /// The current phase
    phase: ScannerPhase,
}

impl<T: ScanTarget, S: CheckpointStore> BlockScanner<T, S> {
    /// Create a scanner, loading its cursor and state from the store
    pub async fn new(
        target: T,
        store: S,
        publisher: Arc<Publisher>,
        config: ScannerConfig,
    ) -> Result<Self, ScanError> {
        let state = AggregateState::new(target.chain());
        let mut scanner = Self {
            cursor: target.initial_cursor(),
            target,
            store,
            publisher,
            range: config.max_range.max(1),
            config,
            state,
            failures: 0,
            phase: ScannerPhase::Idle,
        };

        scanner.reload().await?;
        info!(
            chain = %scanner.target.chain(),
            target = %scanner.target.id(),
            cursor = scanner.cursor,
            "scanner initialized"
        );
        Ok(scanner)
    }

    /// The last committed block
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// The state as of the cursor
    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    /// The current window size
    pub fn range(&self) -> u64 {
        self.range
    }

    /// The current phase
    pub fn phase(&self) -> ScannerPhase {
        self.phase
    }

    /// Reload the cursor and state from the store
    pub async fn reload(&mut self) -> Result<(), ScanError> {
        let chain = self.target.chain();
        if let Some(cursor) = self.store.load_cursor(chain, self.target.id()).await? {
            self.cursor = cursor.last_processed_block;
        }

        let mut state =
            self.store.load_aggregate_state(chain).await?.unwrap_or_else(|| AggregateState::new(chain));
        self.target.hydrate(&mut state).await?;
        self.state = state;
        Ok(())
    }

    /// Run one pass of the loop, scanning and committing at most one window
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome, ScanError> {
        self.transition(ScannerPhase::Idle);
        let height = self.target.current_height().await?;
        let Some(window) = next_window(self.target.window_kind(), self.cursor, height, self.range) else {
            return Ok(StepOutcome::UpToDate);
        };

        self.transition(ScannerPhase::Scanning(window));
        let output = tokio::select! {
            output = self.target.scan(window, &self.state) => output?,
            _ = cancel.cancelled() => {
                info!(target = %self.target.id(), %window, "discarding window on shutdown");
                return Ok(StepOutcome::Cancelled);
            },
        };

        self.transition(ScannerPhase::Committing(window));
        let cursor = ScanCursor::new(self.target.chain(), self.target.id(), window.to);
        match self.store.commit(&cursor, &output.delta).await? {
            CommitOutcome::Applied => {
                self.cursor = window.to;
                self.state = output.state;
                self.range = self.config.max_range.max(1);
                self.failures = 0;
                self.publisher.publish_all(&output.gauges);
                self.target.publish(&self.state, window, &self.publisher);
                self.publisher.set_gauge(&self.alert_name(), 0.);
                debug!(target = %self.target.id(), %window, "committed window");
                Ok(StepOutcome::Committed(window))
            },
            CommitOutcome::AlreadyApplied => {
                warn!(target = %self.target.id(), %window, "window already committed, reloading");
                self.reload().await?;
                Ok(StepOutcome::AlreadyApplied(window))
            },
        }
    }

    /// Run the loop until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(target = %self.target.id(), "starting scan loop");
        while !cancel.is_cancelled() {
            let delay = match self.step(&cancel).await {
                Ok(StepOutcome::UpToDate) => self.config.poll_interval,
                Ok(StepOutcome::Committed(_)) => self.target.throttle().unwrap_or(Duration::ZERO),
                Ok(StepOutcome::AlreadyApplied(_)) | Ok(StepOutcome::Cancelled) => Duration::ZERO,
                Err(e) => self.on_error(&e),
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = cancel.cancelled() => {},
                }
            }
        }

        info!(target = %self.target.id(), cursor = self.cursor, "scan loop stopped");
    }

    // -----------
    // | Helpers |
    // -----------

    /// Record a failed window, returning the delay before the next attempt
    fn on_error(&mut self, e: &ScanError) -> Duration {
        let recovery = e.recovery(self.target.window_kind());
        if matches!(recovery, Recovery::ShrinkRange | Recovery::ShrinkRangeAndBackoff) {
            let range = shrink_range(self.range);
            warn!(target = %self.target.id(), from = self.range, to = range, "shrinking scan range: {e}");
            self.range = range;
        }

        if recovery == Recovery::ShrinkRange {
            return Duration::ZERO;
        }

        self.transition(ScannerPhase::Failed);
        self.publisher.set_gauge(&self.alert_name(), 1.);
        let delay =
            with_jitter(backoff_delay(self.config.base_backoff, self.config.max_backoff, self.failures));
        self.failures = self.failures.saturating_add(1);
        error!(
            chain = %self.target.chain(),
            target = %self.target.id(),
            cursor = self.cursor,
            failures = self.failures,
            "scan failed, retrying in {:.1}s: {e}",
            delay.as_secs_f64()
        );
        delay
    }

    /// Move to a new phase
    fn transition(&mut self, phase: ScannerPhase) {
        if self.phase != phase {
            debug!(target = %self.target.id(), from = ?self.phase, to = ?phase, "scanner transition");
            self.phase = phase;
        }
    }

    /// The connectivity alert of this loop
    fn alert_name(&self) -> String {
        format!("{ALERT_NOT_CONNECTED_PREFIX}{}", self.target.id())
    }
}

/// The next window after the cursor, if the chain has advanced past it
pub fn next_window(kind: WindowKind, cursor: u64, height: u64, range: u64) -> Option<BlockWindow> {
    if cursor >= height {
        return None;
    }

    match kind {
        WindowKind::Ranged => {
            let to = cursor.saturating_add(range.max(1)).min(height);
            Some(BlockWindow::new(cursor + 1, to))
        },
        WindowKind::Snapshot => Some(BlockWindow::new(height, height)),
    }
}

/// Shrink a window size by a tenth, by at least one, never below one
pub fn shrink_range(range: u64) -> u64 {
    let shrunk = (range - range / 10).max(1);
    if shrunk == range && range > 1 { range - 1 } else { shrunk }
}

/// The backoff after `failures` consecutive failures, `base * 2^failures`
/// capped at `max`
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.min(31));
    base.saturating_mul(factor).min(max)
}

/// Add up to ten percent of random jitter to a delay
fn with_jitter(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..=BACKOFF_JITTER);
    delay.mul_f64(1. + jitter)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::{
        aggregator::EventAggregator,
        chain_reader::{
            ChainReader, ReaderConfig,
            mock_chain::{MockChainClient, MockConnector},
        },
        checkpoint::mock_checkpoint_store::MockCheckpointStore,
        endpoint_pool::EndpointPool,
        targets::events::EventsTarget,
        types::{EventPayload, EventRecord, ProtocolConstants},
    };

    /// The scanner tunables used in tests
    const CONFIG: ScannerConfig = ScannerConfig {
        max_range: 2_500,
        poll_interval: Duration::from_millis(10),
        base_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(60),
    };

    /// The constants used by the scanner tests
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

    /// A synthetic three block chain: a deposit at block 2 and a reward at
    /// block 3
    fn three_block_chain() -> MockChainClient {
        let client = MockChainClient::default();
        client.set_height(3);
        client.push_event(EventRecord {
            block_number: 2,
            log_index: 0,
            payload: EventPayload::Deposited { sender: Address::repeat_byte(1), amount: U256::from(100u64) },
        });
        client.push_event(EventRecord {
            block_number: 3,
            log_index: 0,
            payload: EventPayload::Rewards {
                ledger: Address::repeat_byte(9),
                rewards: U256::from(5u64),
                balance: U256::from(10_005u64),
            },
        });
        client
    }

    /// An events target over the mock chain
    fn events_target(
        client: &MockChainClient,
        store: &Arc<MockCheckpointStore>,
    ) -> (EventsTarget<MockChainClient>, Arc<EndpointPool>) {
        let urls = vec!["ws://a".to_string()];
        let pool = Arc::new(EndpointPool::new(ChainId::Parachain, &urls, Duration::from_secs(60)).unwrap());
        let config = ReaderConfig { call_timeout: Duration::from_secs(5), max_attempts: None, max_range: 2_500 };
        let connector = Arc::new(MockConnector::new(client.clone()));
        let reader = Arc::new(ChainReader::new(pool.clone(), connector, config));
        let aggregator = EventAggregator::new(&constants(), 100);
        let store: Arc<dyn CheckpointStore> = store.clone();

        (EventsTarget::new(reader, aggregator, store, 1), pool)
    }

    /// A scanner over the mock chain and store
    async fn scanner(
        client: &MockChainClient,
        store: &Arc<MockCheckpointStore>,
    ) -> BlockScanner<EventsTarget<MockChainClient>, Arc<MockCheckpointStore>> {
        let (target, _) = events_target(client, store);
        BlockScanner::new(target, store.clone(), Arc::new(Publisher::new("")), CONFIG).await.unwrap()
    }

    #[test]
    fn test_next_window() {
        assert_eq!(next_window(WindowKind::Ranged, 0, 3, 2_500), Some(BlockWindow::new(1, 3)));
        assert_eq!(next_window(WindowKind::Ranged, 10, 100, 20), Some(BlockWindow::new(11, 30)));
        assert_eq!(next_window(WindowKind::Ranged, 3, 3, 2_500), None);
        assert_eq!(next_window(WindowKind::Snapshot, 5, 9, 2_500), Some(BlockWindow::new(9, 9)));
        assert_eq!(next_window(WindowKind::Snapshot, 9, 9, 2_500), None);
    }

    #[test]
    fn test_shrink_range() {
        assert_eq!(shrink_range(2_500), 2_250);
        assert_eq!(shrink_range(9), 8);
        assert_eq!(shrink_range(2), 1);
        assert_eq!(shrink_range(1), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, max, 6), max);
        assert_eq!(backoff_delay(base, max, 40), max);

        let jittered = with_jitter(Duration::from_secs(10));
        assert!(jittered >= Duration::from_secs(10) && jittered <= Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_three_block_chain_end_to_end() {
        let client = three_block_chain();
        let store = Arc::new(MockCheckpointStore::default());
        let mut scanner = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        let outcome = scanner.step(&cancel).await.unwrap();
        assert_eq!(outcome, StepOutcome::Committed(BlockWindow::new(1, 3)));
        assert_eq!(scanner.cursor(), 3);

        let stored = store.load_aggregate_state(ChainId::Parachain).await.unwrap().unwrap();
        assert_eq!(stored.buffered_deposits, U256::from(100u64));
        assert_eq!(stored.deposited_count, 1);
        assert_eq!(stored.rewards_aggregated, U256::from(5u64));
        let cursor = store.load_cursor(ChainId::Parachain, ScanTargetId::Events).await.unwrap().unwrap();
        assert_eq!(cursor.last_processed_block, 3);

        assert_eq!(scanner.step(&cancel).await.unwrap(), StepOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_rescan_is_already_applied() {
        let client = three_block_chain();
        let store = Arc::new(MockCheckpointStore::default());
        let mut first = scanner(&client, &store).await;
        let mut stale = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        first.step(&cancel).await.unwrap();
        let committed = store.load_aggregate_state(ChainId::Parachain).await.unwrap();

        let outcome = stale.step(&cancel).await.unwrap();
        assert_eq!(outcome, StepOutcome::AlreadyApplied(BlockWindow::new(1, 3)));
        assert_eq!(store.load_aggregate_state(ChainId::Parachain).await.unwrap(), committed);
        assert_eq!(stale.cursor(), 3);
        assert_eq!(stale.state(), first.state());
        assert_eq!(store.applied_commits().await, 1);
    }

    #[tokio::test]
    async fn test_range_too_large_shrinks_without_backoff() {
        let client = three_block_chain();
        client.set_max_results(1);
        let store = Arc::new(MockCheckpointStore::default());
        let mut scanner = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        let err = scanner.step(&cancel).await.unwrap_err();
        assert_eq!(scanner.on_error(&err), Duration::ZERO);
        assert_eq!(scanner.range(), 2_250);
        assert_eq!(scanner.cursor(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_pool_backs_off_and_keeps_cursor() {
        let client = three_block_chain();
        client.fail_next_calls(usize::MAX);
        let store = Arc::new(MockCheckpointStore::default());
        let mut scanner = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        let err = scanner.step(&cancel).await.unwrap_err();
        assert!(matches!(err, ScanError::Chain(crate::chain_reader::error::ChainReaderError::ChainUnavailable { .. })));

        let delay = scanner.on_error(&err);
        assert!(delay >= Duration::from_secs(1));
        assert_eq!(scanner.phase(), ScannerPhase::Failed);
        assert_eq!(scanner.cursor(), 0);
        assert_eq!(scanner.publisher.get("alert_not_connected_events"), Some(1.));
    }

    #[tokio::test]
    async fn test_failed_commit_is_retried_from_same_cursor() {
        let client = three_block_chain();
        let store = Arc::new(MockCheckpointStore::default());
        store.fail_next_commits(1).await;
        let mut scanner = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        let err = scanner.step(&cancel).await.unwrap_err();
        assert!(matches!(err, ScanError::Store(_)));
        assert_eq!(scanner.cursor(), 0);

        let outcome = scanner.step(&cancel).await.unwrap();
        assert_eq!(outcome, StepOutcome::Committed(BlockWindow::new(1, 3)));
        assert_eq!(scanner.state().deposited_count, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let client = three_block_chain();
        let store = Arc::new(MockCheckpointStore::default());
        let scanner = scanner(&client, &store).await;
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(scanner.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        let cursor = store.load_cursor(ChainId::Parachain, ScanTargetId::Events).await.unwrap();
        assert_eq!(cursor.map(|c| c.last_processed_block), Some(3));
    }
}
