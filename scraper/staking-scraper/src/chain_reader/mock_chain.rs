//! An in-memory chain used to exercise readers and scanners in tests

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{
    chain_reader::{ChainClient, Connector, LogSource, error::CallError},
    types::{BlockWindow, EventRecord},
};

/// The contents of the mock chain
#[derive(Default)]
struct MockChainState {
    /// The finalized height
    height: u64,
    /// Every event on the chain
    events: Vec<EventRecord>,
    /// The windows requested so far
    requests: Vec<BlockWindow>,
    /// The maximum number of events a log query may return
    max_results: Option<usize>,
    /// The number of upcoming calls that fail with a transport error
    failing_calls: usize,
    /// Whether calls never complete
    hanging: bool,
}

/// A mock chain client, clones share state
#[derive(Clone, Default)]
pub struct MockChainClient {
    /// The shared chain contents
    state: Arc<Mutex<MockChainState>>,
}

impl MockChainClient {
    /// Lock the chain contents
    fn lock(&self) -> MutexGuard<'_, MockChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the finalized height
    pub fn set_height(&self, height: u64) {
        self.lock().height = height;
    }

    /// Add an event to the chain
    pub fn push_event(&self, event: EventRecord) {
        self.lock().events.push(event);
    }

    /// Reject log queries returning more than `n` events
    pub fn set_max_results(&self, n: usize) {
        self.lock().max_results = Some(n);
    }

    /// Fail the next `n` calls with a transport error
    pub fn fail_next_calls(&self, n: usize) {
        self.lock().failing_calls = n;
    }

    /// Make every call hang
    pub fn set_hanging(&self, hanging: bool) {
        self.lock().hanging = hanging;
    }

    /// The log windows requested so far
    pub fn requests(&self) -> Vec<BlockWindow> {
        self.lock().requests.clone()
    }

    /// Check for injected failures
    fn check_call(&self) -> Result<bool, CallError> {
        let mut state = self.lock();
        if state.hanging {
            return Ok(true);
        }
        if state.failing_calls > 0 {
            state.failing_calls -= 1;
            return Err(CallError::transport("connection reset by peer"));
        }

        Ok(false)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn current_height(&self) -> Result<u64, CallError> {
        if self.check_call()? {
            std::future::pending::<()>().await;
        }

        Ok(self.lock().height)
    }
}

#[async_trait]
impl LogSource for MockChainClient {
    async fn logs_in_range(&self, window: BlockWindow) -> Result<Vec<EventRecord>, CallError> {
        if self.check_call()? {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        state.requests.push(window);
        let events: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|e| e.block_number >= window.from && e.block_number <= window.to)
            .cloned()
            .collect();

        if let Some(max) = state.max_results.filter(|max| events.len() > *max) {
            return Err(CallError::RangeTooLarge(format!("query returned more than {max} results")));
        }

        Ok(events)
    }
}

/// A connector handing out a shared mock client
pub struct MockConnector {
    /// The client handed out for every URL
    client: MockChainClient,
    /// URLs that refuse connections
    refused: HashSet<String>,
}

impl MockConnector {
    /// Create a connector for the given client
    pub fn new(client: MockChainClient) -> Self {
        Self { client, refused: HashSet::new() }
    }

    /// Refuse connections to the given URL
    pub fn refusing(mut self, url: &str) -> Self {
        self.refused.insert(url.to_string());
        self
    }
}

#[async_trait]
impl Connector<MockChainClient> for MockConnector {
    async fn connect(&self, url: &str) -> Result<MockChainClient, CallError> {
        if self.refused.contains(url) {
            return Err(CallError::transport(format!("connection refused: {url}")));
        }

        Ok(self.client.clone())
    }
}
