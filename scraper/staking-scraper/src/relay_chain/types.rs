//! SCALE-encoded storage values of the relay chain's pallets

use parity_scale_codec::{Decode, Encode};

/// A relay chain account id
pub type AccountId = [u8; 32];

/// `Staking.ActiveEra`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ActiveEraInfo {
    /// The era index
    pub index: u32,
    /// The era's start time in milliseconds, unset until the first block of
    /// the era
    pub start: Option<u64>,
}

/// A chunk of stake scheduled to unbond
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct UnlockChunk {
    /// The amount unbonding
    #[codec(compact)]
    pub value: u128,
    /// The era at which the chunk unlocks
    #[codec(compact)]
    pub era: u32,
}

/// The leading fields of `Staking.Ledger`.
///
/// Later runtime versions append fields after `unlocking`; decoding reads the
/// prefix and ignores the rest.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct StakingLedger {
    /// The stash account
    pub stash: AccountId,
    /// The total bonded amount, including unlocking chunks
    #[codec(compact)]
    pub total: u128,
    /// The amount actively staked
    #[codec(compact)]
    pub active: u128,
    /// The chunks being unbonded
    pub unlocking: Vec<UnlockChunk>,
}

impl StakingLedger {
    /// The total amount being unbonded
    pub fn total_unlocking(&self) -> u128 {
        self.unlocking.iter().fold(0u128, |acc, chunk| acc.saturating_add(chunk.value))
    }

    /// The earliest era at which a chunk unlocks, zero without chunks
    pub fn earliest_unlocking_era(&self) -> u32 {
        self.unlocking.iter().map(|chunk| chunk.era).min().unwrap_or(0)
    }
}

/// `Staking.Nominators`
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Nominations {
    /// The nominated validators
    pub targets: Vec<AccountId>,
    /// The era the nominations were submitted in
    pub submitted_in: u32,
    /// Whether the nominations were suppressed by a slash
    pub suppressed: bool,
}

/// The balances of `System.Account`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    /// The free balance
    pub free: u128,
    /// The reserved balance
    pub reserved: u128,
    /// The frozen balance
    pub frozen: u128,
    /// Runtime-internal account flags
    pub flags: u128,
}

/// `System.Account`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    /// The account nonce
    pub nonce: u32,
    /// The number of consumer references
    pub consumers: u32,
    /// The number of provider references
    pub providers: u32,
    /// The number of sufficient references
    pub sufficients: u32,
    /// The account balances
    pub data: AccountData,
}
