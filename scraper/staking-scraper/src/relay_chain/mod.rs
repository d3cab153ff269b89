//! A client for the Substrate relay chain, reading the staking pallets through
//! the node's JSON-RPC storage interface

use alloy::{
    providers::WsConnect,
    rpc::client::{ClientBuilder, RpcClient},
};
use async_trait::async_trait;
use parity_scale_codec::Decode;
use serde::Deserialize;

use crate::chain_reader::{ChainClient, Connector, error::CallError};

pub mod queries;
pub mod ss58;
pub mod storage;
pub mod types;

/// A relay chain block header, reduced to the fields the scraper reads
#[derive(Debug, Deserialize)]
struct RelayHeader {
    /// The block number as a hex string
    number: String,
}

// ----------
// | Client |
// ----------

/// A websocket JSON-RPC client of a relay chain node
#[derive(Clone)]
pub struct RelayChainClient {
    /// The underlying RPC client
    rpc: RpcClient,
}

impl RelayChainClient {
    /// Create a client over an existing RPC client
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// The hash of the latest finalized block
    pub async fn finalized_head(&self) -> Result<String, CallError> {
        let hash: String = self.rpc.request_noparams("chain_getFinalizedHead").await?;
        Ok(hash)
    }

    /// The number of the block with the given hash
    pub async fn block_number(&self, hash: &str) -> Result<u64, CallError> {
        let header: Option<RelayHeader> =
            self.rpc.request("chain_getHeader", (hash.to_string(),)).await?;
        let header = header.ok_or_else(|| CallError::decode(format!("unknown block {hash}")))?;
        parse_hex_number(&header.number)
    }

    /// The hash of the block at the given height
    pub async fn block_hash(&self, number: u64) -> Result<String, CallError> {
        let hash: Option<String> = self.rpc.request("chain_getBlockHash", (number,)).await?;
        hash.ok_or_else(|| CallError::decode(format!("no block at height {number}")))
    }

    /// Read the raw storage value under a key at the given block
    pub async fn storage_raw(&self, key: &[u8], at: &str) -> Result<Option<Vec<u8>>, CallError> {
        let key = format!("0x{}", hex::encode(key));
        let value: Option<String> =
            self.rpc.request("state_getStorage", (key, at.to_string())).await?;

        value
            .map(|v| hex::decode(v.trim_start_matches("0x")).map_err(CallError::decode))
            .transpose()
    }

    /// Read and SCALE-decode a storage value at the given block
    pub async fn storage<T: Decode>(&self, key: &[u8], at: &str) -> Result<Option<T>, CallError> {
        match self.storage_raw(key, at).await? {
            Some(bytes) => Ok(Some(T::decode(&mut &bytes[..])?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChainClient for RelayChainClient {
    async fn current_height(&self) -> Result<u64, CallError> {
        let head = self.finalized_head().await?;
        self.block_number(&head).await
    }
}

/// Opens relay chain clients over websocket
#[derive(Clone, Copy, Debug, Default)]
pub struct RelayChainConnector;

#[async_trait]
impl Connector<RelayChainClient> for RelayChainConnector {
    async fn connect(&self, url: &str) -> Result<RelayChainClient, CallError> {
        let rpc = ClientBuilder::default().ws(WsConnect::new(url)).await?;
        Ok(RelayChainClient::new(rpc))
    }
}

// -----------
// | Helpers |
// -----------

/// Parse a `0x`-prefixed hex block number
fn parse_hex_number(value: &str) -> Result<u64, CallError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| CallError::decode(format!("invalid block number {value}: {e}")))
}
