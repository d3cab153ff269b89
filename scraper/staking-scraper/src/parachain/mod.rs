//! A client for the EVM parachain hosting the liquid staking contracts

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use async_trait::async_trait;

use crate::{
    chain_reader::{ChainClient, Connector, LogSource, error::CallError},
    parachain::contracts::Nimbus,
    types::{BlockWindow, EventPayload, EventRecord},
};

#[allow(missing_docs)]
#[allow(clippy::missing_docs_in_private_items)]
pub mod contracts;
pub mod queries;

// ---------
// | Types |
// ---------

/// The addresses of the liquid staking contracts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractAddresses {
    /// The Nimbus contract, which also is the nToken
    pub nimbus: Address,
    /// The OracleMaster contract
    pub oracle_master: Address,
    /// The Withdrawal contract
    pub withdrawal: Address,
    /// The xcToken contract
    pub xctoken: Address,
    /// The Controller contract
    pub controller: Address,
}

/// The Nimbus event topics the scraper understands
pub fn nimbus_event_topics() -> Vec<B256> {
    vec![
        Nimbus::Transfer::SIGNATURE_HASH,
        Nimbus::Deposited::SIGNATURE_HASH,
        Nimbus::Redeemed::SIGNATURE_HASH,
        Nimbus::Rewards::SIGNATURE_HASH,
        Nimbus::Losses::SIGNATURE_HASH,
    ]
}

// ----------
// | Client |
// ----------

/// A websocket client of a parachain node
#[derive(Clone)]
pub struct ParachainClient {
    /// The provider connected to the node
    provider: DynProvider,
    /// The contract addresses
    addresses: ContractAddresses,
}

impl ParachainClient {
    /// Create a client over an existing provider
    pub fn new(provider: DynProvider, addresses: ContractAddresses) -> Self {
        Self { provider, addresses }
    }

    /// The provider connected to the node
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// The contract addresses
    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }
}

#[async_trait]
impl ChainClient for ParachainClient {
    async fn current_height(&self) -> Result<u64, CallError> {
        let block = self.provider.get_block_by_number(BlockNumberOrTag::Finalized).await?;
        block
            .map(|block| block.header.number)
            .ok_or_else(|| CallError::decode("node returned no finalized block"))
    }
}

#[async_trait]
impl LogSource for ParachainClient {
    async fn logs_in_range(&self, window: BlockWindow) -> Result<Vec<EventRecord>, CallError> {
        let filter = Filter::new()
            .address(self.addresses.nimbus)
            .event_signature(nimbus_event_topics())
            .from_block(window.from)
            .to_block(window.to);

        let logs = self.provider.get_logs(&filter).await?;
        logs.iter().map(decode_nimbus_log).collect()
    }
}

/// Opens parachain clients over websocket
pub struct ParachainConnector {
    /// The contract addresses handed to every client
    addresses: ContractAddresses,
}

impl ParachainConnector {
    /// Create a new connector
    pub fn new(addresses: ContractAddresses) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl Connector<ParachainClient> for ParachainConnector {
    async fn connect(&self, url: &str) -> Result<ParachainClient, CallError> {
        let provider = ProviderBuilder::new().connect_ws(WsConnect::new(url)).await?.erased();
        Ok(ParachainClient::new(provider, self.addresses))
    }
}

// -----------
// | Helpers |
// -----------

/// Decode a Nimbus log into an event record
pub fn decode_nimbus_log(log: &Log) -> Result<EventRecord, CallError> {
    let block_number =
        log.block_number.ok_or_else(|| CallError::decode("log is missing its block number"))?;
    let log_index = log.log_index.ok_or_else(|| CallError::decode("log is missing its index"))?;
    let topic0 = *log.topics().first().ok_or_else(|| CallError::decode("log has no topics"))?;
    let data = &log.inner.data;

    let payload = if topic0 == Nimbus::Transfer::SIGNATURE_HASH {
        let e = Nimbus::Transfer::decode_log_data(data).map_err(CallError::decode)?;
        EventPayload::Transfer { from: e.from, to: e.to, value: e.value }
    } else if topic0 == Nimbus::Deposited::SIGNATURE_HASH {
        let e = Nimbus::Deposited::decode_log_data(data).map_err(CallError::decode)?;
        EventPayload::Deposited { sender: e.sender, amount: e.amount }
    } else if topic0 == Nimbus::Redeemed::SIGNATURE_HASH {
        let e = Nimbus::Redeemed::decode_log_data(data).map_err(CallError::decode)?;
        EventPayload::Redeemed { receiver: e.receiver, amount: e.amount }
    } else if topic0 == Nimbus::Rewards::SIGNATURE_HASH {
        let e = Nimbus::Rewards::decode_log_data(data).map_err(CallError::decode)?;
        EventPayload::Rewards { ledger: e.ledger, rewards: e.rewards, balance: e.balance }
    } else if topic0 == Nimbus::Losses::SIGNATURE_HASH {
        let e = Nimbus::Losses::decode_log_data(data).map_err(CallError::decode)?;
        EventPayload::Losses { ledger: e.ledger, losses: e.losses, balance: e.balance }
    } else {
        return Err(CallError::decode(format!(
            "unknown Nimbus event topic {topic0} at block {block_number}"
        )));
    };

    Ok(EventRecord { block_number, log_index, payload })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{LogData, U256};

    use super::*;

    /// Wrap encoded log data in an RPC log
    fn rpc_log(data: LogData, block_number: u64, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log { address: Address::repeat_byte(0x42), data },
            block_number: Some(block_number),
            log_index: Some(log_index),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_deposited() {
        let event = Nimbus::Deposited { sender: Address::repeat_byte(1), amount: U256::from(100u64) };
        let log = rpc_log(event.encode_log_data(), 2, 0);

        let record = decode_nimbus_log(&log).unwrap();
        assert_eq!(record.block_number, 2);
        assert_eq!(
            record.payload,
            EventPayload::Deposited { sender: Address::repeat_byte(1), amount: U256::from(100u64) }
        );
    }

    #[test]
    fn test_decode_rewards() {
        let event = Nimbus::Rewards {
            ledger: Address::repeat_byte(7),
            rewards: U256::from(5u64),
            balance: U256::from(1_005u64),
        };
        let log = rpc_log(event.encode_log_data(), 3, 4);

        let record = decode_nimbus_log(&log).unwrap();
        assert_eq!(record.ordering_key(), (3, 4));
        assert!(matches!(record.payload, EventPayload::Rewards { .. }));
    }

    #[test]
    fn test_unknown_topic_is_decode_error() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0xee)], Default::default());
        let log = rpc_log(data, 1, 0);
        assert!(matches!(decode_nimbus_log(&log), Err(CallError::Decode(_))));
    }

    #[test]
    fn test_missing_position_is_decode_error() {
        let event = Nimbus::Redeemed { receiver: Address::ZERO, amount: U256::from(1u64) };
        let mut log = rpc_log(event.encode_log_data(), 1, 0);
        log.log_index = None;
        assert!(matches!(decode_nimbus_log(&log), Err(CallError::Decode(_))));
    }
}
