//! Reads chain height, event logs and contract state through an endpoint pool,
//! retrying failed calls on other endpoints.
//!
//! The reader is generic over the client type of the chain, so that the same
//! retry discipline drives the EVM parachain client and the Substrate relay
//! chain client.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    chain_reader::error::{CallError, ChainReaderError},
    endpoint_pool::{Endpoint, EndpointPool, Outcome},
    types::{BlockWindow, ChainId, EventRecord},
};

pub mod error;
#[cfg(test)]
pub mod mock_chain;

// ---------------
// | Client Seam |
// ---------------

/// Opens a client connection to a node
#[async_trait]
pub trait Connector<C>: Send + Sync {
    /// Connect to the node at the given URL
    async fn connect(&self, url: &str) -> Result<C, CallError>;
}

/// A connected client of some chain
#[async_trait]
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// The latest finalized block number
    async fn current_height(&self) -> Result<u64, CallError>;
}

/// A client able to fetch decoded contract events
#[async_trait]
pub trait LogSource: ChainClient {
    /// Fetch the decoded events emitted within the window
    async fn logs_in_range(&self, window: BlockWindow) -> Result<Vec<EventRecord>, CallError>;
}

/// A typed read of chain state at a given block
#[async_trait]
pub trait StateQuery<C>: Send + Sync {
    /// The decoded result of the query
    type Output: Send;

    /// Run the query against a client at the given block
    async fn run(&self, client: &C, at_block: u64) -> Result<Self::Output, CallError>;
}

// -----------------
// | Configuration |
// -----------------

/// Tunables of the chain reader
#[derive(Clone, Copy, Debug)]
pub struct ReaderConfig {
    /// The time allowed for each call
    pub call_timeout: Duration,
    /// The maximum number of attempts per call, defaults to the pool size plus
    /// one
    pub max_attempts: Option<usize>,
    /// The maximum number of blocks covered by one log query
    pub max_range: u64,
}

// ----------------
// | Chain Reader |
// ----------------

/// A reader over one chain's endpoint pool
pub struct ChainReader<C> {
    /// The chain being read
    chain: ChainId,
    /// The endpoints of the chain
    pool: Arc<EndpointPool>,
    /// Opens clients for endpoints
    connector: Arc<dyn Connector<C>>,
    /// Connected clients, keyed by endpoint id
    clients: Mutex<HashMap<usize, C>>,
    /// Tunables
    config: ReaderConfig,
}

impl<C: ChainClient> ChainReader<C> {
    /// Create a new reader
    pub fn new(
        pool: Arc<EndpointPool>,
        connector: Arc<dyn Connector<C>>,
        config: ReaderConfig,
    ) -> Self {
        Self { chain: pool.chain(), pool, connector, clients: Mutex::new(HashMap::new()), config }
    }

    /// The chain being read
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// The latest finalized block number
    pub async fn current_height(&self) -> Result<u64, ChainReaderError> {
        self.with_client("current_height", |client| async move { client.current_height().await })
            .await
    }

    /// Run a typed state query at the given block
    pub async fn fetch_contract_state<Q: StateQuery<C>>(
        &self,
        query: &Q,
        at_block: u64,
    ) -> Result<Q::Output, ChainReaderError> {
        self.with_client("fetch_contract_state", |client| async move {
            query.run(&client, at_block).await
        })
        .await
    }

    /// Run a call against a healthy endpoint, failing over to other endpoints
    /// on transport errors and timeouts
    pub async fn with_client<T, F, Fut>(&self, op: &str, f: F) -> Result<T, ChainReaderError>
    where
        F: Fn(C) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.config.max_attempts.unwrap_or(self.pool.size() + 1).max(1);
        let mut attempts = 0;
        let mut last_error = String::from("no attempt made");
        let mut timed_out = false;

        while attempts < max_attempts {
            let endpoint = match self.pool.acquire() {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    last_error = e.to_string();
                    break;
                },
            };
            attempts += 1;

            let client = match self.client_for(&endpoint).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(chain = %self.chain, url = %endpoint.url, op, "failed to connect: {e}");
                    self.fail(&endpoint).await;
                    last_error = e.to_string();
                    timed_out = false;
                    continue;
                },
            };

            match tokio::time::timeout(self.config.call_timeout, f(client)).await {
                Ok(Ok(value)) => {
                    self.pool.report(&endpoint, Outcome::Success);
                    return Ok(value);
                },
                Ok(Err(CallError::RangeTooLarge(message))) => {
                    self.pool.report(&endpoint, Outcome::Success);
                    return Err(ChainReaderError::RangeTooLarge { chain: self.chain, message });
                },
                Ok(Err(CallError::Decode(msg))) => {
                    return Err(ChainReaderError::Decode(msg));
                },
                Ok(Err(CallError::Transport(msg))) => {
                    warn!(chain = %self.chain, url = %endpoint.url, op, attempt = attempts, "call failed: {msg}");
                    self.fail(&endpoint).await;
                    last_error = msg;
                    timed_out = false;
                },
                Err(_) => {
                    warn!(chain = %self.chain, url = %endpoint.url, op, attempt = attempts, "call timed out");
                    self.fail(&endpoint).await;
                    last_error = format!(
                        "{op} timed out after {}s",
                        self.config.call_timeout.as_secs_f64()
                    );
                    timed_out = true;
                },
            }
        }

        Err(ChainReaderError::ChainUnavailable {
            chain: self.chain,
            attempts,
            last_error,
            timed_out,
        })
    }

    // -----------
    // | Helpers |
    // -----------

    /// Get the cached client of an endpoint, connecting if needed
    async fn client_for(&self, endpoint: &Endpoint) -> Result<C, CallError> {
        if let Some(client) = self.clients.lock().await.get(&endpoint.id) {
            return Ok(client.clone());
        }

        debug!(chain = %self.chain, url = %endpoint.url, "connecting to endpoint");
        let client = tokio::time::timeout(self.config.call_timeout, self.connector.connect(&endpoint.url))
            .await
            .map_err(|_| CallError::transport(format!("connecting to {} timed out", endpoint.url)))??;

        self.clients.lock().await.insert(endpoint.id, client.clone());
        Ok(client)
    }

    /// Quarantine an endpoint and drop its connection
    async fn fail(&self, endpoint: &Endpoint) {
        self.pool.report(endpoint, Outcome::Failure);
        self.clients.lock().await.remove(&endpoint.id);
    }
}

impl<C: LogSource> ChainReader<C> {
    /// Fetch every event in the window, in ascending `(block, log_index)`
    /// order.
    ///
    /// The window is split into sub-windows of at most `max_range` blocks,
    /// which are fetched sequentially. The fetch fails as a whole if any
    /// sub-window fails.
    pub async fn fetch_events(&self, window: BlockWindow) -> Result<Vec<EventRecord>, ChainReaderError> {
        let mut events = Vec::new();
        for sub_window in plan_sub_windows(window.from, window.to, self.config.max_range) {
            debug!(chain = %self.chain, from = sub_window.from, to = sub_window.to, "fetching logs");
            let mut batch = self
                .with_client("logs_in_range", |client| async move {
                    client.logs_in_range(sub_window).await
                })
                .await?;
            events.append(&mut batch);
        }

        events.sort_by_key(EventRecord::ordering_key);
        Ok(events)
    }
}

/// Split `[from, to]` into consecutive windows of at most `max_range` blocks
pub fn plan_sub_windows(from: u64, to: u64, max_range: u64) -> Vec<BlockWindow> {
    let max_range = max_range.max(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(max_range - 1).min(to);
        windows.push(BlockWindow::new(start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }

    windows
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256};

    use crate::{
        chain_reader::mock_chain::{MockChainClient, MockConnector},
        types::EventPayload,
    };

    use super::*;

    /// The call timeout used in tests
    const CALL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build a reader over a mock chain with the given endpoint URLs
    fn mock_reader(
        client: &MockChainClient,
        urls: &[&str],
        max_range: u64,
    ) -> (ChainReader<MockChainClient>, Arc<EndpointPool>) {
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        let pool = Arc::new(
            EndpointPool::new(ChainId::Parachain, &urls, Duration::from_secs(60)).unwrap(),
        );
        let connector = Arc::new(MockConnector::new(client.clone()));
        let config = ReaderConfig { call_timeout: CALL_TIMEOUT, max_attempts: None, max_range };
        (ChainReader::new(pool.clone(), connector, config), pool)
    }

    /// A deposit event at the given position
    fn deposit(block_number: u64, log_index: u64) -> EventRecord {
        EventRecord {
            block_number,
            log_index,
            payload: EventPayload::Deposited {
                sender: Address::repeat_byte(1),
                amount: U256::from(1u64),
            },
        }
    }

    #[test]
    fn test_plan_sub_windows_exact_split() {
        let windows = plan_sub_windows(1, 10_000, 2_500);
        assert_eq!(
            windows,
            vec![
                BlockWindow::new(1, 2_500),
                BlockWindow::new(2_501, 5_000),
                BlockWindow::new(5_001, 7_500),
                BlockWindow::new(7_501, 10_000),
            ]
        );
    }

    #[test]
    fn test_plan_sub_windows_partial_tail() {
        let windows = plan_sub_windows(10, 24, 10);
        assert_eq!(windows, vec![BlockWindow::new(10, 19), BlockWindow::new(20, 24)]);
        assert_eq!(plan_sub_windows(5, 5, 2_500), vec![BlockWindow::new(5, 5)]);
    }

    #[tokio::test]
    async fn test_fetch_events_issues_bounded_requests() {
        let client = MockChainClient::default();
        client.push_event(deposit(7_600, 1));
        client.push_event(deposit(3, 0));
        client.push_event(deposit(7_600, 0));
        let (reader, _) = mock_reader(&client, &["ws://a"], 2_500);

        let events = reader.fetch_events(BlockWindow::new(1, 10_000)).await.unwrap();

        assert_eq!(client.requests().len(), 4);
        assert_eq!(client.requests()[3], BlockWindow::new(7_501, 10_000));
        let keys: Vec<(u64, u64)> = events.iter().map(EventRecord::ordering_key).collect();
        assert_eq!(keys, vec![(3, 0), (7_600, 0), (7_600, 1)]);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_over() {
        let client = MockChainClient::default();
        client.set_height(42);
        client.fail_next_calls(1);
        let (reader, pool) = mock_reader(&client, &["ws://a", "ws://b"], 2_500);

        assert_eq!(reader.current_height().await.unwrap(), 42);
        assert_eq!(pool.healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_chain_unavailable() {
        let client = MockChainClient::default();
        client.fail_next_calls(usize::MAX);
        let (reader, pool) = mock_reader(&client, &["ws://a", "ws://b"], 2_500);

        let err = reader.current_height().await.unwrap_err();
        assert!(matches!(err, ChainReaderError::ChainUnavailable { attempts: 2, timed_out: false, .. }));
        assert_eq!(pool.healthy_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_fails_over() {
        let client = MockChainClient::default();
        client.set_height(7);
        let urls: Vec<String> = vec!["ws://down".to_string(), "ws://up".to_string()];
        let pool = Arc::new(EndpointPool::new(ChainId::RelayChain, &urls, Duration::from_secs(60)).unwrap());
        let connector = Arc::new(MockConnector::new(client.clone()).refusing("ws://down"));
        let config = ReaderConfig { call_timeout: CALL_TIMEOUT, max_attempts: None, max_range: 10 };
        let reader = ChainReader::new(pool.clone(), connector, config);

        assert_eq!(reader.current_height().await.unwrap(), 7);
        assert_eq!(pool.healthy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_call_times_out() {
        let client = MockChainClient::default();
        client.set_hanging(true);
        let (reader, _) = mock_reader(&client, &["ws://a"], 2_500);

        let err = reader.current_height().await.unwrap_err();
        assert!(matches!(err, ChainReaderError::ChainUnavailable { timed_out: true, .. }));
    }

    #[tokio::test]
    async fn test_range_too_large_does_not_blame_endpoint() {
        let client = MockChainClient::default();
        client.push_event(deposit(1, 0));
        client.push_event(deposit(2, 0));
        client.set_max_results(1);
        let (reader, pool) = mock_reader(&client, &["ws://a"], 2_500);

        let err = reader.fetch_events(BlockWindow::new(1, 2)).await.unwrap_err();
        assert!(matches!(err, ChainReaderError::RangeTooLarge { .. }));
        assert_eq!(pool.healthy_count(), 1);
    }
}
