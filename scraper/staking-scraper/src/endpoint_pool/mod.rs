//! A pool of redundant node endpoints for a single chain, with health tracking
//! and failover.
//!
//! Failed endpoints are quarantined for a fixed timeout and are promoted back
//! to healthy either by a successful call or by the expiry of their quarantine,
//! which is checked on every acquire.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
    endpoint_pool::{
        clock::{Clock, SystemClock},
        error::EndpointPoolError,
    },
    publisher::{
        Publisher,
        labels::{CHAIN_TAG, ENDPOINT_POOL_HEALTHY_ENDPOINTS},
    },
    types::ChainId,
};

pub mod clock;
pub mod error;

// ---------
// | Types |
// ---------

/// A node endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// The index of the endpoint within its pool
    pub id: usize,
    /// The websocket URL of the node
    pub url: String,
    /// The chain served by the node
    pub chain: ChainId,
}

/// The health of an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    /// The endpoint may be handed out
    Healthy,
    /// The endpoint failed recently and is withheld until the expiry passes
    Quarantined {
        /// The instant at which the quarantine may be lifted
        expiry: Instant,
    },
}

/// The result of a call made against an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded
    Success,
    /// The call failed or timed out
    Failure,
}

/// An endpoint and its health
#[derive(Debug)]
struct Slot {
    /// The endpoint
    endpoint: Endpoint,
    /// The endpoint's health
    health: HealthState,
}

/// The mutable state of the pool
#[derive(Debug)]
struct PoolState {
    /// The endpoints, in configuration order
    slots: Vec<Slot>,
    /// The slot from which the next round-robin walk starts
    cursor: usize,
}

impl PoolState {
    /// Walk the slots from the cursor and return the first healthy endpoint
    fn next_healthy(&mut self) -> Option<Endpoint> {
        let n = self.slots.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            if self.slots[idx].health == HealthState::Healthy {
                self.cursor = (idx + 1) % n;
                return Some(self.slots[idx].endpoint.clone());
            }
        }

        None
    }

    /// Promote every quarantined endpoint whose expiry has passed, returning
    /// the number promoted
    fn promote_expired(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        for slot in self.slots.iter_mut() {
            if matches!(slot.health, HealthState::Quarantined { expiry } if expiry <= now) {
                slot.health = HealthState::Healthy;
                info!(chain = %slot.endpoint.chain, url = %slot.endpoint.url, "endpoint quarantine expired");
                promoted += 1;
            }
        }

        promoted
    }

    /// The number of healthy endpoints
    fn healthy_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.health == HealthState::Healthy).count()
    }
}

// -----------------
// | Endpoint Pool |
// -----------------

/// A pool of endpoints for one chain, shared between scan loops
pub struct EndpointPool {
    /// The chain served by the pool
    chain: ChainId,
    /// How long a failed endpoint is withheld
    quarantine_timeout: Duration,
    /// The clock used to stamp quarantines
    clock: Arc<dyn Clock>,
    /// The endpoints and the round-robin cursor
    state: Mutex<PoolState>,
    /// The publisher to which the healthy endpoint count is reported
    publisher: Option<Arc<Publisher>>,
}

impl EndpointPool {
    /// Create a pool over the given URLs using the system clock
    pub fn new(
        chain: ChainId,
        urls: &[String],
        quarantine_timeout: Duration,
    ) -> Result<Self, EndpointPoolError> {
        Self::new_with_clock(chain, urls, quarantine_timeout, Arc::new(SystemClock))
    }

    /// Create a pool over the given URLs using the given clock
    pub fn new_with_clock(
        chain: ChainId,
        urls: &[String],
        quarantine_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EndpointPoolError> {
        if urls.is_empty() {
            return Err(EndpointPoolError::Empty { chain });
        }

        let slots = urls
            .iter()
            .enumerate()
            .map(|(id, url)| Slot {
                endpoint: Endpoint { id, url: url.clone(), chain },
                health: HealthState::Healthy,
            })
            .collect();

        let state = Mutex::new(PoolState { slots, cursor: 0 });
        Ok(Self { chain, quarantine_timeout, clock, state, publisher: None })
    }

    /// Report the healthy endpoint count to the given publisher
    pub fn with_publisher(mut self, publisher: Arc<Publisher>) -> Self {
        self.publisher = Some(publisher);
        self.publish_health(&self.lock_state());
        self
    }

    /// The chain served by the pool
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// The number of endpoints in the pool, healthy or not
    pub fn size(&self) -> usize {
        self.lock_state().slots.len()
    }

    /// The number of healthy endpoints
    pub fn healthy_count(&self) -> usize {
        self.lock_state().healthy_count()
    }

    /// Acquire the next healthy endpoint in round-robin order.
    ///
    /// Expired quarantines are lifted before the walk, so a recovered endpoint
    /// rejoins the rotation even while others are healthy.
    pub fn acquire(&self) -> Result<Endpoint, EndpointPoolError> {
        let mut state = self.lock_state();
        let promoted = state.promote_expired(self.clock.now());
        if promoted > 0 {
            self.publish_health(&state);
        }

        state.next_healthy().ok_or(EndpointPoolError::Exhausted { chain: self.chain })
    }

    /// Report the outcome of a call made against an endpoint
    pub fn report(&self, endpoint: &Endpoint, outcome: Outcome) {
        let mut state = self.lock_state();
        let Some(slot) = state.slots.get_mut(endpoint.id) else {
            return;
        };

        match (outcome, slot.health) {
            (Outcome::Success, HealthState::Quarantined { .. }) => {
                slot.health = HealthState::Healthy;
                info!(chain = %self.chain, url = %endpoint.url, "endpoint recovered");
            },
            (Outcome::Failure, _) => {
                let expiry = self.clock.now() + self.quarantine_timeout;
                if slot.health == HealthState::Healthy {
                    warn!(
                        chain = %self.chain,
                        url = %endpoint.url,
                        timeout_secs = self.quarantine_timeout.as_secs(),
                        "quarantining endpoint"
                    );
                }
                slot.health = HealthState::Quarantined { expiry };
            },
            (Outcome::Success, HealthState::Healthy) => return,
        }

        self.publish_health(&state);
    }

    // -----------
    // | Helpers |
    // -----------

    /// Lock the pool state, recovering from a poisoned lock
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the healthy endpoint count
    fn publish_health(&self, state: &PoolState) {
        if let Some(publisher) = &self.publisher {
            publisher.set_labeled_gauge(
                ENDPOINT_POOL_HEALTHY_ENDPOINTS,
                CHAIN_TAG,
                self.chain.as_str(),
                state.healthy_count() as f64,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{endpoint_pool::clock::MockClock, publisher::render_key};

    use super::*;

    /// The quarantine timeout used in tests
    const TIMEOUT: Duration = Duration::from_secs(60);

    /// Build a pool of `n` endpoints over a mock clock
    fn mock_pool(n: usize) -> (EndpointPool, Arc<MockClock>) {
        let urls: Vec<String> = (0..n).map(|i| format!("ws://node-{i}:9944")).collect();
        let clock = Arc::new(MockClock::default());
        let pool =
            EndpointPool::new_with_clock(ChainId::Parachain, &urls, TIMEOUT, clock.clone()).unwrap();
        (pool, clock)
    }

    #[test]
    fn test_acquire_round_robin() {
        let (pool, _) = mock_pool(3);
        let ids: Vec<usize> = (0..4).map(|_| pool.acquire().unwrap().id).collect();
        assert_eq!(ids, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let res = EndpointPool::new(ChainId::RelayChain, &[], TIMEOUT);
        assert!(matches!(res, Err(EndpointPoolError::Empty { chain: ChainId::RelayChain })));
    }

    #[test]
    fn test_failover_and_quarantine_expiry() {
        let (pool, clock) = mock_pool(2);

        let first = pool.acquire().unwrap();
        pool.report(&first, Outcome::Failure);
        let second = pool.acquire().unwrap();
        assert_ne!(first.id, second.id);

        pool.report(&second, Outcome::Failure);
        assert_eq!(pool.healthy_count(), 0);
        assert!(matches!(pool.acquire(), Err(EndpointPoolError::Exhausted { .. })));

        // Not yet expired
        clock.advance(TIMEOUT - Duration::from_secs(1));
        assert!(pool.acquire().is_err());

        clock.advance(Duration::from_secs(1));
        assert!(pool.acquire().is_ok());
        assert_eq!(pool.healthy_count(), 2);
    }

    #[test]
    fn test_success_restores_quarantined_endpoint() {
        let (pool, _) = mock_pool(2);

        let endpoint = pool.acquire().unwrap();
        pool.report(&endpoint, Outcome::Failure);
        assert_eq!(pool.healthy_count(), 1);

        pool.report(&endpoint, Outcome::Success);
        assert_eq!(pool.healthy_count(), 2);
    }

    #[test]
    fn test_quarantined_endpoint_skipped() {
        let (pool, _) = mock_pool(3);
        let bad = Endpoint { id: 1, url: "ws://node-1:9944".to_string(), chain: ChainId::Parachain };
        pool.report(&bad, Outcome::Failure);

        let ids: Vec<usize> = (0..4).map(|_| pool.acquire().unwrap().id).collect();
        assert_eq!(ids, vec![0, 2, 0, 2]);
    }

    #[test]
    fn test_failing_endpoint_rejoins_after_timeout() {
        let (pool, clock) = mock_pool(3);
        let a = pool.acquire().unwrap();
        assert_eq!(a.id, 0);
        pool.report(&a, Outcome::Failure);

        let ids: Vec<usize> = (0..4).map(|_| pool.acquire().unwrap().id).collect();
        assert_eq!(ids, vec![1, 2, 1, 2]);

        clock.advance(TIMEOUT - Duration::from_secs(1));
        assert!((0..4).all(|_| pool.acquire().unwrap().id != a.id));

        // The others stay healthy, the expiry alone brings A back
        clock.advance(Duration::from_secs(1));
        let ids: Vec<usize> = (0..3).map(|_| pool.acquire().unwrap().id).collect();
        assert!(ids.contains(&a.id));
        assert_eq!(pool.healthy_count(), 3);
    }

    #[test]
    fn test_healthy_count_is_published() {
        let (pool, _) = mock_pool(2);
        let publisher = Arc::new(Publisher::new("scraper_"));
        let pool = pool.with_publisher(publisher.clone());
        let key = render_key(ENDPOINT_POOL_HEALTHY_ENDPOINTS, CHAIN_TAG, "parachain");
        assert_eq!(publisher.get(&key), Some(2.));

        let endpoint = pool.acquire().unwrap();
        pool.report(&endpoint, Outcome::Failure);
        assert_eq!(publisher.get(&key), Some(1.));
    }
}
