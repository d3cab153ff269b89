//! Typed reads of relay chain staking state

use std::future::Future;

use alloy::primitives::U256;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use parity_scale_codec::Decode;

use crate::{
    chain_reader::{StateQuery, error::CallError},
    parachain::queries::StashLedger,
    relay_chain::{
        RelayChainClient,
        ss58::ss58_encode,
        storage::{StorageHasher, storage_map_key, storage_value_key},
        types::{AccountId, AccountInfo, ActiveEraInfo, Nominations, StakingLedger},
    },
    types::{LedgerStatus, RelayLedgerRecord, ValidatorsInfo},
};

// ---------
// | Types |
// ---------

/// The relay chain staking state at one block
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStakingSnapshot {
    /// The block the snapshot was taken at
    pub block_number: u64,
    /// The block timestamp in seconds
    pub timestamp_secs: u64,
    /// The active era
    pub active_era: Option<ActiveEraInfo>,
    /// The total stake of the active era
    pub total_staked: U256,
    /// The total issuance of the native token
    pub total_issuance: U256,
    /// The number of auctions held so far
    pub auction_counter: u32,
    /// The validators of the current session
    pub session_validators: Vec<AccountId>,
    /// The staking state of every stash
    pub ledgers: Vec<RelayLedgerRecord>,
    /// The free balance of the payout account, if configured
    pub payout_balance: Option<U256>,
}

// -----------
// | Queries |
// -----------

/// Reads the staking state of the relay chain and of the given stashes
#[derive(Clone, Debug)]
pub struct RelayStakingQuery {
    /// The stashes controlled by parachain ledgers
    pub stashes: Vec<StashLedger>,
    /// The payout service account
    pub payout_account: Option<AccountId>,
    /// The address format of the relay chain
    pub ss58_format: u16,
}

#[async_trait]
impl StateQuery<RelayChainClient> for RelayStakingQuery {
    type Output = RelayStakingSnapshot;

    async fn run(&self, client: &RelayChainClient, at_block: u64) -> Result<RelayStakingSnapshot, CallError> {
        let hash = client.block_hash(at_block).await?;
        let reader = StorageReader { client, hash: &hash };

        let active_era = reader.active_era().await?;
        let total_staked = match active_era {
            Some(era) => reader.eras_total_stake(era.index).await?,
            None => 0,
        };
        let session_validators = reader.session_validators().await?;

        let mut ledgers = Vec::with_capacity(self.stashes.len());
        for stash in self.stashes.iter() {
            let record = reader.relay_ledger(stash, &session_validators, self.ss58_format).await?;
            ledgers.push(record);
        }

        let payout_balance = match self.payout_account {
            Some(account) => Some(U256::from(reader.free_balance(&account).await?)),
            None => None,
        };

        Ok(RelayStakingSnapshot {
            block_number: at_block,
            timestamp_secs: reader.timestamp_millis().await? / 1_000,
            active_era,
            total_staked: U256::from(total_staked),
            total_issuance: U256::from(reader.total_issuance().await?),
            auction_counter: reader.auction_counter().await?,
            session_validators,
            ledgers,
            payout_balance,
        })
    }
}

/// Reads the index of the active era
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveEraQuery;

#[async_trait]
impl StateQuery<RelayChainClient> for ActiveEraQuery {
    type Output = u32;

    async fn run(&self, client: &RelayChainClient, at_block: u64) -> Result<u32, CallError> {
        let hash = client.block_hash(at_block).await?;
        let reader = StorageReader { client, hash: &hash };
        reader
            .active_era()
            .await?
            .map(|era| era.index)
            .ok_or_else(|| CallError::decode(format!("no active era at block {at_block}")))
    }
}

/// Reads the active stake and nominated validators of each stash
#[derive(Clone, Debug)]
pub struct ValidatorsInfoQuery {
    /// The stashes controlled by parachain ledgers
    pub stashes: Vec<StashLedger>,
    /// The address format of the relay chain
    pub ss58_format: u16,
}

#[async_trait]
impl StateQuery<RelayChainClient> for ValidatorsInfoQuery {
    type Output = Vec<ValidatorsInfo>;

    async fn run(&self, client: &RelayChainClient, at_block: u64) -> Result<Vec<ValidatorsInfo>, CallError> {
        let hash = client.block_hash(at_block).await?;
        let reader = StorageReader { client, hash: &hash };

        try_join_all(self.stashes.iter().map(|stash| self.read_stash(&reader, stash))).await
    }
}

impl ValidatorsInfoQuery {
    /// Read the active stake and nomination targets of one stash
    async fn read_stash(
        &self,
        reader: &StorageReader<'_>,
        stash: &StashLedger,
    ) -> Result<ValidatorsInfo, CallError> {
        let active_stake = match reader.bonded(&stash.stash).await? {
            Some(controller) => reader.ledger(&controller).await?.map(|l| l.active).unwrap_or(0),
            None => 0,
        };
        let validators = reader
            .nominators(&stash.stash)
            .await?
            .map(|n| n.targets.iter().map(|t| ss58_encode(t, self.ss58_format)).collect())
            .unwrap_or_default();

        Ok(ValidatorsInfo {
            ledger: stash.ledger,
            stash: ss58_encode(&stash.stash, self.ss58_format),
            active_stake: U256::from(active_stake),
            validators,
        })
    }
}

/// Find the first block in `[low, high]` whose active era is at least `era`.
///
/// Returns `high` when no block in the range qualifies.
pub async fn find_era_start_block<F, Fut, E>(era: u32, low: u64, high: u64, era_at: F) -> Result<u64, E>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<u32, E>>,
{
    let (mut lo, mut hi) = (low, high);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if era_at(mid).await? >= era {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    Ok(lo)
}

// ------------------
// | Storage Reader |
// ------------------

/// Typed accessors for the storage items the scraper reads, pinned to a block
struct StorageReader<'a> {
    /// The client to read through
    client: &'a RelayChainClient,
    /// The block hash to read at
    hash: &'a str,
}

impl StorageReader<'_> {
    /// Read a storage value
    async fn value<T: Decode>(&self, pallet: &str, item: &str) -> Result<Option<T>, CallError> {
        self.client.storage(&storage_value_key(pallet, item), self.hash).await
    }

    /// Read an entry of a storage map
    async fn map<T: Decode>(
        &self,
        pallet: &str,
        item: &str,
        hasher: StorageHasher,
        key: &[u8],
    ) -> Result<Option<T>, CallError> {
        self.client.storage(&storage_map_key(pallet, item, hasher, key), self.hash).await
    }

    /// `Staking.ActiveEra`
    async fn active_era(&self) -> Result<Option<ActiveEraInfo>, CallError> {
        self.value("Staking", "ActiveEra").await
    }

    /// `Staking.ErasTotalStake`
    async fn eras_total_stake(&self, era: u32) -> Result<u128, CallError> {
        let stake =
            self.map("Staking", "ErasTotalStake", StorageHasher::Twox64Concat, &era.to_le_bytes()).await?;
        Ok(stake.unwrap_or(0))
    }

    /// `Staking.Bonded`, the controller of a stash
    async fn bonded(&self, stash: &AccountId) -> Result<Option<AccountId>, CallError> {
        self.map("Staking", "Bonded", StorageHasher::Twox64Concat, stash).await
    }

    /// `Staking.Ledger`, keyed by controller
    async fn ledger(&self, controller: &AccountId) -> Result<Option<StakingLedger>, CallError> {
        self.map("Staking", "Ledger", StorageHasher::Blake2_128Concat, controller).await
    }

    /// `Staking.Nominators`
    async fn nominators(&self, account: &AccountId) -> Result<Option<Nominations>, CallError> {
        self.map("Staking", "Nominators", StorageHasher::Twox64Concat, account).await
    }

    /// `Session.Validators`
    async fn session_validators(&self) -> Result<Vec<AccountId>, CallError> {
        Ok(self.value("Session", "Validators").await?.unwrap_or_default())
    }

    /// `Balances.TotalIssuance`
    async fn total_issuance(&self) -> Result<u128, CallError> {
        Ok(self.value("Balances", "TotalIssuance").await?.unwrap_or(0))
    }

    /// `Auctions.AuctionCounter`
    async fn auction_counter(&self) -> Result<u32, CallError> {
        Ok(self.value("Auctions", "AuctionCounter").await?.unwrap_or(0))
    }

    /// `Timestamp.Now`, in milliseconds
    async fn timestamp_millis(&self) -> Result<u64, CallError> {
        Ok(self.value("Timestamp", "Now").await?.unwrap_or(0))
    }

    /// The free balance of `System.Account`
    async fn free_balance(&self, account: &AccountId) -> Result<u128, CallError> {
        let info: Option<AccountInfo> =
            self.map("System", "Account", StorageHasher::Blake2_128Concat, account).await?;
        Ok(info.map(|info| info.data.free).unwrap_or(0))
    }

    /// Assemble the relay view of a parachain ledger's stash
    async fn relay_ledger(
        &self,
        stash: &StashLedger,
        session_validators: &[AccountId],
        ss58_format: u16,
    ) -> Result<RelayLedgerRecord, CallError> {
        let stash_balance = self.free_balance(&stash.stash).await?;
        let unlocking = self.ledger(&stash.stash).await?;
        let total_unlocking = unlocking.as_ref().map(StakingLedger::total_unlocking).unwrap_or(0);
        let earliest_era = unlocking.as_ref().map(StakingLedger::earliest_unlocking_era).unwrap_or(0);

        let mut record = RelayLedgerRecord {
            ledger: stash.ledger,
            stash: ss58_encode(&stash.stash, ss58_format),
            active_balance: U256::ZERO,
            total_balance: U256::ZERO,
            stash_balance: U256::from(stash_balance),
            stake_status: LedgerStatus::None,
            validators_count: 0,
            total_unlocking_balance: U256::from(total_unlocking),
            earliest_era_for_unlocking: u64::from(earliest_era),
        };

        let Some(controller) = self.bonded(&stash.stash).await? else {
            return Ok(record);
        };

        if let Some(ledger) = self.ledger(&controller).await? {
            record.active_balance = U256::from(ledger.active);
            record.total_balance = U256::from(ledger.total);
        }

        record.stake_status = if self.nominators(&stash.stash).await?.is_some() {
            LedgerStatus::Nominator
        } else if session_validators.contains(&stash.stash) {
            LedgerStatus::Validator
        } else {
            LedgerStatus::Idle
        };
        record.validators_count =
            self.nominators(&controller).await?.map(|n| n.targets.len() as u64).unwrap_or(0);

        Ok(record)
    }
}
