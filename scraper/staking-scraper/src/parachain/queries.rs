//! Typed reads of parachain contract state

use alloy::{eips::BlockId, primitives::{Address, B256, U256}, providers::Provider};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    chain_reader::{StateQuery, error::CallError},
    parachain::{
        ParachainClient,
        contracts::{Ledger, Nimbus, OracleMaster, Withdrawal, XcToken},
    },
    types::{LedgerRecord, LedgerStatus},
    utils::u256_to_u64_saturating,
};

// ---------
// | Types |
// ---------

/// The era values of the OracleMaster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OracleEra {
    /// The era at which the oracle's era schedule is anchored
    pub anchor_era_id: u64,
    /// The unix time at which the anchor era started
    pub anchor_timestamp: u64,
    /// The configured era length in seconds
    pub seconds_per_era: u64,
    /// `getCurrentEraId`, derived from the block timestamp
    pub current_era_id: u64,
    /// `eraId`, the last era reported by the oracles
    pub era_id: u64,
}

/// The Withdrawal contract state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WithdrawalSnapshot {
    /// The xcToken balance of the Withdrawal contract
    pub tokens: U256,
    /// The amount ready to be claimed
    pub pending_for_claiming: U256,
    /// The virtual xcToken amount
    pub total_virtual_xctoken_amount: U256,
    /// The xcToken pool shares
    pub total_xctoken_pool_shares: U256,
}

/// The full contract state of the parachain at one block
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParachainSnapshot {
    /// The nToken total supply
    pub total_supply: U256,
    /// The nToken balance held by Nimbus itself
    pub nimbus_tokens: U256,
    /// Deposits buffered in Nimbus
    pub buffered_deposits: U256,
    /// Redeems buffered in Nimbus
    pub buffered_redeems: U256,
    /// Every ledger, including removed ones
    pub ledgers: Vec<LedgerRecord>,
    /// The native balance of every oracle member
    pub oracle_balances: Vec<(Address, U256)>,
    /// The OracleMaster era values
    pub oracle_era: OracleEra,
    /// The xcToken balance of the Controller
    pub controller_balance: U256,
    /// The Withdrawal contract state
    pub withdrawal: WithdrawalSnapshot,
}

/// A relay chain stash and the parachain ledger controlling it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StashLedger {
    /// The stash public key
    pub stash: [u8; 32],
    /// The ledger contract
    pub ledger: Address,
}

/// The contract listing the stash accounts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StashSource {
    /// `OracleMaster.getStashAccounts`
    OracleMaster,
    /// `Nimbus.getStashAccounts`
    Nimbus,
}

// -----------
// | Queries |
// -----------

/// Reads the full contract state of the parachain
#[derive(Clone, Copy, Debug, Default)]
pub struct ParachainSnapshotQuery;

#[async_trait]
impl StateQuery<ParachainClient> for ParachainSnapshotQuery {
    type Output = ParachainSnapshot;

    async fn run(&self, client: &ParachainClient, at_block: u64) -> Result<ParachainSnapshot, CallError> {
        let block = BlockId::number(at_block);
        let addresses = client.addresses();
        let provider = client.provider().clone();
        let nimbus = Nimbus::new(addresses.nimbus, provider.clone());
        let xctoken = XcToken::new(addresses.xctoken, provider.clone());

        let total_supply = nimbus.totalSupply().block(block).call().await?;
        let nimbus_tokens = nimbus.balanceOf(addresses.nimbus).block(block).call().await?;
        let buffered_deposits = nimbus.bufferedDeposits().block(block).call().await?;
        let buffered_redeems = nimbus.bufferedRedeems().block(block).call().await?;

        let ledger_addresses = nimbus.getLedgerAddresses().block(block).call().await?;
        let mut ledgers = Vec::with_capacity(ledger_addresses.len());
        for ledger in ledger_addresses {
            ledgers.push(read_ledger(client, ledger, block).await?);
        }

        let oracle_balances = read_oracle_balances(client, block).await?;
        let oracle_era = read_oracle_era(client, block).await?;
        let controller_balance = xctoken.balanceOf(addresses.controller).block(block).call().await?;

        let withdrawal_contract = Withdrawal::new(addresses.withdrawal, provider);
        let withdrawal = WithdrawalSnapshot {
            tokens: xctoken.balanceOf(addresses.withdrawal).block(block).call().await?,
            pending_for_claiming: withdrawal_contract.pendingForClaiming().block(block).call().await?,
            total_virtual_xctoken_amount: withdrawal_contract
                .totalVirtualXcTokenAmount()
                .block(block)
                .call()
                .await?,
            total_xctoken_pool_shares: withdrawal_contract
                .totalXcTokenPoolShares()
                .block(block)
                .call()
                .await?,
        };

        Ok(ParachainSnapshot {
            total_supply,
            nimbus_tokens,
            buffered_deposits,
            buffered_redeems,
            ledgers,
            oracle_balances,
            oracle_era,
            controller_balance,
            withdrawal,
        })
    }
}

/// Reads the stash accounts and the ledger of each
#[derive(Clone, Copy, Debug)]
pub struct StashLedgersQuery {
    /// The contract listing the stashes
    pub source: StashSource,
}

#[async_trait]
impl StateQuery<ParachainClient> for StashLedgersQuery {
    type Output = Vec<StashLedger>;

    async fn run(&self, client: &ParachainClient, at_block: u64) -> Result<Vec<StashLedger>, CallError> {
        let block = BlockId::number(at_block);
        let addresses = client.addresses();
        let nimbus = Nimbus::new(addresses.nimbus, client.provider().clone());

        let stashes: Vec<B256> = match self.source {
            StashSource::OracleMaster => {
                let oracle = OracleMaster::new(addresses.oracle_master, client.provider().clone());
                oracle.getStashAccounts().block(block).call().await?
            },
            StashSource::Nimbus => nimbus.getStashAccounts().block(block).call().await?,
        };

        let mut stash_ledgers = Vec::with_capacity(stashes.len());
        for stash in stashes {
            let ledger = nimbus.findLedger(stash).block(block).call().await?;
            stash_ledgers.push(StashLedger { stash: stash.0, ledger });
        }

        debug!(count = stash_ledgers.len(), "read stash accounts");
        Ok(stash_ledgers)
    }
}

// -----------
// | Helpers |
// -----------

/// Read a ledger's contract state along with its Nimbus and xcToken values
async fn read_ledger(
    client: &ParachainClient,
    ledger: Address,
    block: BlockId,
) -> Result<LedgerRecord, CallError> {
    let addresses = client.addresses();
    let provider = client.provider().clone();
    let contract = Ledger::new(ledger, provider.clone());
    let nimbus = Nimbus::new(addresses.nimbus, provider.clone());
    let xctoken = XcToken::new(addresses.xctoken, provider);

    let status_code = contract.status().block(block).call().await?;
    let status = LedgerStatus::from_code(status_code)
        .ok_or_else(|| CallError::decode(format!("ledger {ledger} has unknown status {status_code}")))?;

    Ok(LedgerRecord {
        ledger,
        active_balance: contract.activeBalance().block(block).call().await?,
        cached_total_balance: contract.cachedTotalBalance().block(block).call().await?,
        locked_balance: contract.lockedBalance().block(block).call().await?,
        status,
        total_balance: contract.totalBalance().block(block).call().await?,
        transfer_downward_balance: contract.transferDownwardBalance().block(block).call().await?,
        transfer_upward_balance: contract.transferUpwardBalance().block(block).call().await?,
        stake: nimbus.ledgerStake(ledger).block(block).call().await?,
        borrow: nimbus.ledgerBorrow(ledger).block(block).call().await?,
        xctoken_balance: xctoken.balanceOf(ledger).block(block).call().await?,
    })
}

/// Read the oracle members and their native balances.
///
/// `members` has no length getter, so indices are probed up to `MAX_MEMBERS`
/// until a call reverts.
async fn read_oracle_balances(
    client: &ParachainClient,
    block: BlockId,
) -> Result<Vec<(Address, U256)>, CallError> {
    let oracle = OracleMaster::new(client.addresses().oracle_master, client.provider().clone());
    let max_members = u256_to_u64_saturating(oracle.MAX_MEMBERS().block(block).call().await?);

    let mut balances = Vec::new();
    for index in 0..max_members {
        let member = match oracle.members(U256::from(index)).block(block).call().await {
            Ok(member) => member,
            Err(alloy::contract::Error::TransportError(e)) if e.is_error_resp() => break,
            Err(e) => return Err(e.into()),
        };

        let balance = client.provider().get_balance(member).block_id(block).await?;
        balances.push((member, balance));
    }

    Ok(balances)
}

/// Read the OracleMaster era values
async fn read_oracle_era(client: &ParachainClient, block: BlockId) -> Result<OracleEra, CallError> {
    let oracle = OracleMaster::new(client.addresses().oracle_master, client.provider().clone());

    Ok(OracleEra {
        anchor_era_id: oracle.ANCHOR_ERA_ID().block(block).call().await?,
        anchor_timestamp: oracle.ANCHOR_TIMESTAMP().block(block).call().await?,
        seconds_per_era: oracle.SECONDS_PER_ERA().block(block).call().await?,
        current_era_id: oracle.getCurrentEraId().block(block).call().await?,
        era_id: oracle.eraId().block(block).call().await?,
    })
}
