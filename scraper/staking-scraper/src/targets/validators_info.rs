//! Exports the validators nominated by every ledger's stash

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    chain_reader::ChainReader,
    checkpoint::AggregateDelta,
    parachain::{
        ParachainClient,
        queries::{StashLedgersQuery, StashSource},
    },
    publisher::Publisher,
    relay_chain::{RelayChainClient, queries::ValidatorsInfoQuery},
    scanner::{ScanOutput, ScanTarget, WindowKind, error::ScanError},
    types::{AggregateState, BlockWindow, ChainId, ScanTargetId, ValidatorsInfo},
};

/// The validators info loop
pub struct ValidatorsInfoTarget {
    /// The relay chain reader
    relay: Arc<ChainReader<RelayChainClient>>,
    /// The parachain reader, used to list the stash accounts
    parachain: Arc<ChainReader<ParachainClient>>,
    /// The address format of the relay chain
    ss58_format: u16,
    /// The pause after each export
    waiting_time: Duration,
}

impl ValidatorsInfoTarget {
    /// Create a new validators info target
    pub fn new(
        relay: Arc<ChainReader<RelayChainClient>>,
        parachain: Arc<ChainReader<ParachainClient>>,
        ss58_format: u16,
        waiting_time: Duration,
    ) -> Self {
        Self { relay, parachain, ss58_format, waiting_time }
    }
}

#[async_trait]
impl ScanTarget for ValidatorsInfoTarget {
    fn id(&self) -> ScanTargetId {
        ScanTargetId::ValidatorsInfo
    }

    fn chain(&self) -> ChainId {
        ChainId::RelayChain
    }

    fn window_kind(&self) -> WindowKind {
        WindowKind::Snapshot
    }

    fn throttle(&self) -> Option<Duration> {
        Some(self.waiting_time)
    }

    async fn current_height(&self) -> Result<u64, ScanError> {
        Ok(self.relay.current_height().await?)
    }

    async fn scan(&self, window: BlockWindow, state: &AggregateState) -> Result<ScanOutput, ScanError> {
        let para_height = self.parachain.current_height().await?;
        let stashes = self
            .parachain
            .fetch_contract_state(&StashLedgersQuery { source: StashSource::Nimbus }, para_height)
            .await?;

        let query = ValidatorsInfoQuery { stashes, ss58_format: self.ss58_format };
        let infos = self.relay.fetch_contract_state(&query, window.to).await?;
        info!(block = window.to, ledgers = infos.len(), "read validators info");

        Ok(validators_output(state, infos))
    }

    fn publish(&self, _state: &AggregateState, _window: BlockWindow, _publisher: &Publisher) {
        // Validators info is exported to the store only
    }
}

/// Wrap a validators info set in a replacing delta
pub fn validators_output(state: &AggregateState, infos: Vec<ValidatorsInfo>) -> ScanOutput {
    let mut delta = AggregateDelta::new(ChainId::RelayChain);
    delta.validators_info = Some(infos);
    ScanOutput::new(state.clone(), delta)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::{
        checkpoint::{CheckpointStore, mock_checkpoint_store::MockCheckpointStore},
        types::ScanCursor,
    };

    /// A validators info set for one ledger
    fn infos(validators: &[&str]) -> Vec<ValidatorsInfo> {
        vec![ValidatorsInfo {
            ledger: Address::repeat_byte(1),
            stash: "5Stash".into(),
            active_stake: U256::from(10u64),
            validators: validators.iter().map(|v| v.to_string()).collect(),
        }]
    }

    #[tokio::test]
    async fn test_export_replaces_previous_set() {
        let store = MockCheckpointStore::default();
        let state = AggregateState::new(ChainId::RelayChain);

        let first = validators_output(&state, infos(&["5A", "5B"]));
        let cursor = ScanCursor::new(ChainId::RelayChain, ScanTargetId::ValidatorsInfo, 10);
        store.commit(&cursor, &first.delta).await.unwrap();

        let second = validators_output(&state, infos(&["5C"]));
        let cursor = ScanCursor::new(ChainId::RelayChain, ScanTargetId::ValidatorsInfo, 20);
        store.commit(&cursor, &second.delta).await.unwrap();

        assert_eq!(store.validators_info().await, infos(&["5C"]));
        assert_eq!(second.state, state);
        assert!(second.delta.scalars.is_empty());
    }
}
