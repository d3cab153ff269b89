//! Domain types shared by the scraping and aggregation engine

use std::{
    collections::{BTreeMap, VecDeque},
    fmt::{self, Display},
};

use alloy::primitives::{Address, I256, U256};
use chrono::{DateTime, Utc};

// ---------------
// | Identifiers |
// ---------------

/// The logical chains indexed by the scraper
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainId {
    /// The EVM parachain hosting the liquid staking contracts
    #[default]
    Parachain,
    /// The relay chain on which the pooled tokens are staked
    RelayChain,
}

impl ChainId {
    /// The identifier used for this chain in persisted rows and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Parachain => "parachain",
            ChainId::RelayChain => "relay_chain",
        }
    }

    /// Parse a chain from its persisted identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parachain" => Some(ChainId::Parachain),
            "relay_chain" => Some(ChainId::RelayChain),
            _ => None,
        }
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The independent scan targets, each of which is driven by its own scan loop
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScanTargetId {
    /// Nimbus contract events on the parachain
    Events,
    /// Contract state snapshots on the parachain
    ParachainState,
    /// Staking pallet snapshots on the relay chain
    RelayState,
    /// Nomination targets of every ledger's stash
    ValidatorsInfo,
}

impl ScanTargetId {
    /// The identifier used for this target in persisted rows and metric names
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTargetId::Events => "events",
            ScanTargetId::ParachainState => "parachain_state",
            ScanTargetId::RelayState => "relay_state",
            ScanTargetId::ValidatorsInfo => "validators_info",
        }
    }

    /// Parse a target from its persisted identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "events" => Some(ScanTargetId::Events),
            "parachain_state" => Some(ScanTargetId::ParachainState),
            "relay_state" => Some(ScanTargetId::RelayState),
            "validators_info" => Some(ScanTargetId::ValidatorsInfo),
            _ => None,
        }
    }
}

impl Display for ScanTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------
// | Windows |
// -----------

/// An inclusive range of block numbers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockWindow {
    /// The first block in the window
    pub from: u64,
    /// The last block in the window
    pub to: u64,
}

impl BlockWindow {
    /// Create a new window, `from` must not exceed `to`
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "window start {from} exceeds window end {to}");
        Self { from, to }
    }

    /// The number of blocks covered by the window
    pub fn num_blocks(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl Display for BlockWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}; {}]", self.from, self.to)
    }
}

/// The durable position of one scan loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanCursor {
    /// The chain being scanned
    pub chain: ChainId,
    /// The scan target owning the cursor
    pub target: ScanTargetId,
    /// The last block whose side effects are durably committed
    pub last_processed_block: u64,
    /// The time at which the cursor was last advanced
    pub last_processed_at: DateTime<Utc>,
}

impl ScanCursor {
    /// Create a cursor positioned at the given block, stamped with the current
    /// time
    pub fn new(chain: ChainId, target: ScanTargetId, last_processed_block: u64) -> Self {
        Self { chain, target, last_processed_block, last_processed_at: Utc::now() }
    }
}

// -----------
// | Ledgers |
// -----------

/// The staking status of a ledger's stash on the relay chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LedgerStatus {
    /// Bonded but neither nominating nor validating
    Idle,
    /// Nominating validators
    Nominator,
    /// In the active validator set
    Validator,
    /// Not bonded at all
    #[default]
    None,
}

impl LedgerStatus {
    /// The numeric code of the status, as exposed by the Ledger contract
    pub fn code(&self) -> u8 {
        match self {
            LedgerStatus::Idle => 0,
            LedgerStatus::Nominator => 1,
            LedgerStatus::Validator => 2,
            LedgerStatus::None => 3,
        }
    }

    /// Parse a status from its numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LedgerStatus::Idle),
            1 => Some(LedgerStatus::Nominator),
            2 => Some(LedgerStatus::Validator),
            3 => Some(LedgerStatus::None),
            _ => None,
        }
    }
}

/// The parachain view of a ledger, read from the Ledger, Nimbus and xcToken
/// contracts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    /// The ledger contract address
    pub ledger: Address,
    /// The ledger's active (staked) balance
    pub active_balance: U256,
    /// The total balance cached at the last oracle report
    pub cached_total_balance: U256,
    /// The balance locked for unbonding
    pub locked_balance: U256,
    /// The ledger's staking status
    pub status: LedgerStatus,
    /// The total balance of the ledger
    pub total_balance: U256,
    /// The balance pending transfer from the relay chain to the parachain
    pub transfer_downward_balance: U256,
    /// The balance pending transfer from the parachain to the relay chain
    pub transfer_upward_balance: U256,
    /// The stake allocated to the ledger by Nimbus
    pub stake: U256,
    /// The amount borrowed by the ledger from Nimbus
    pub borrow: U256,
    /// The ledger's xcToken balance
    pub xctoken_balance: U256,
}

/// The relay chain view of a ledger, read from the staking pallet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayLedgerRecord {
    /// The parachain ledger contract this stash belongs to
    pub ledger: Address,
    /// The ss58 encoded stash account
    pub stash: String,
    /// The active bonded balance
    pub active_balance: U256,
    /// The total bonded balance
    pub total_balance: U256,
    /// The free balance of the stash account
    pub stash_balance: U256,
    /// The staking status of the stash
    pub stake_status: LedgerStatus,
    /// The number of validators nominated by the ledger
    pub validators_count: u64,
    /// The sum of all unlocking chunks
    pub total_unlocking_balance: U256,
    /// The earliest era at which an unlocking chunk matures, zero if none
    pub earliest_era_for_unlocking: u64,
}

/// The nomination targets of a single ledger, exported for operators
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorsInfo {
    /// The parachain ledger contract
    pub ledger: Address,
    /// The ss58 encoded stash account
    pub stash: String,
    /// The stake allocated to the ledger by Nimbus
    pub active_stake: U256,
    /// The ss58 encoded validators nominated by the stash
    pub validators: Vec<String>,
}

// ----------
// | Events |
// ----------

/// The decoded payload of a Nimbus event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
    /// An nToken transfer
    Transfer {
        /// The sender, zero for mints
        from: Address,
        /// The receiver, zero for burns
        to: Address,
        /// The amount transferred
        value: U256,
    },
    /// A deposit into the pool
    Deposited {
        /// The depositor
        sender: Address,
        /// The deposited amount
        amount: U256,
    },
    /// A redeem request
    Redeemed {
        /// The account redeeming
        receiver: Address,
        /// The redeemed amount
        amount: U256,
    },
    /// A ledger reported staking rewards
    Rewards {
        /// The reporting ledger
        ledger: Address,
        /// The reward amount
        rewards: U256,
        /// The ledger balance after the reward
        balance: U256,
    },
    /// A ledger reported slashing losses
    Losses {
        /// The reporting ledger
        ledger: Address,
        /// The lost amount
        losses: U256,
        /// The ledger balance after the loss
        balance: U256,
    },
}

/// A decoded event, positioned within the chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// The block in which the event was emitted
    pub block_number: u64,
    /// The index of the log within its block
    pub log_index: u64,
    /// The decoded event
    pub payload: EventPayload,
}

impl EventRecord {
    /// The key by which events are strictly ordered
    pub fn ordering_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A single ledger report, positive for rewards and negative for losses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardRow {
    /// The reporting ledger
    pub ledger: Address,
    /// The signed reward
    pub reward: I256,
    /// The ledger balance after the report
    pub balance: U256,
    /// The block containing the report
    pub block_number: u64,
}

// ----------------------
// | Protocol Constants |
// ----------------------

/// Economic constants of the relay chain and the staking protocol, loaded once
/// at startup
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProtocolConstants {
    /// The ideal fraction of total issuance that is staked
    pub stake_target: f64,
    /// The maximum number of auctions that lower the ideal stake
    pub auction_max: u32,
    /// The ideal stake reduction per active auction
    pub auction_adjust: f64,
    /// The maximum yearly inflation
    pub max_inflation: f64,
    /// The minimum yearly inflation
    pub min_inflation: f64,
    /// The decay rate of inflation beyond the ideal stake
    pub falloff: f64,
    /// The length of an era in relay chain blocks
    pub era_duration_in_blocks: u64,
    /// The number of eras in a day
    pub eras_per_day: u64,
    /// The lowest per-report APR, in percent, admitted into averages
    pub apr_min: f64,
    /// The highest per-report APR, in percent, admitted into averages
    pub apr_max: f64,
}

// -------------------
// | Aggregate State |
// -------------------

/// Relay chain aggregates
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelayAggregates {
    /// The active era
    pub active_era_id: Option<u64>,
    /// The estimated unix time at which the next era starts
    pub next_era_start_time: Option<i64>,
    /// The size of the session validator set
    pub validators_count: Option<u64>,
    /// The total stake of the active era
    pub total_staked: U256,
    /// The total issuance of the relay chain token
    pub total_issuance: U256,
}

/// The durable aggregate state of one chain.
///
/// Event-derived fields reflect exactly the events up to the events cursor.
/// Snapshot fields reflect the last committed snapshot of their scan target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateState {
    /// The chain this state belongs to
    pub chain: ChainId,

    // --- Snapshot fields --- //
    /// The nToken total supply
    pub total_supply: U256,
    /// The nToken total supply valued in USD, if a price is known
    pub total_supply_usd: Option<f64>,
    /// The Nimbus `bufferedDeposits` at the snapshot block
    pub contract_buffered_deposits: U256,
    /// The Nimbus `bufferedRedeems` at the snapshot block
    pub contract_buffered_redeems: U256,
    /// The OracleMaster `eraId`
    pub era_id: Option<u64>,
    /// The OracleMaster `getCurrentEraId`
    pub current_era_id: Option<u64>,
    /// The next era start time according to the OracleMaster
    pub next_era_start_time: Option<i64>,
    /// Relay chain aggregates
    pub relay: RelayAggregates,
    /// The annualized APR over the last month, divided by twelve
    pub apr_per_month: f64,
    /// The annualized APR over the last week, divided by fifty-two
    pub apr_per_week: f64,
    /// The relay chain inflation rate
    pub inflation_rate: f64,
    /// The estimated staking APY, inflation over staked fraction
    pub estimated_apy: f64,
    /// Parachain ledger records, keyed by ledger address
    pub ledgers: BTreeMap<Address, LedgerRecord>,
    /// Relay chain ledger records, keyed by ledger address
    pub relay_ledgers: BTreeMap<Address, RelayLedgerRecord>,

    // --- Event-derived fields --- //
    /// Deposits buffered by Deposited events
    pub buffered_deposits: U256,
    /// Redeems buffered, drawn down by Redeemed events
    pub buffered_redeems: U256,
    /// The running total of deposits
    pub deposited: U256,
    /// The running total of redeems
    pub redeemed: U256,
    /// The number of Deposited events
    pub deposited_count: u64,
    /// The number of Redeemed events
    pub redeemed_count: u64,
    /// The running total of reported rewards
    pub rewards_aggregated: U256,
    /// The running total of reported losses
    pub losses_aggregated: U256,
    /// The number of addresses with a nonzero tracked balance
    pub holders_number: u64,
    /// Nonzero tracked nToken balances
    pub holder_balances: BTreeMap<Address, U256>,
    /// The last block in which a Nimbus event was seen
    pub last_block_with_events: Option<u64>,
    /// The APR averaged over recent ledger reports
    pub apr: f64,
    /// The most recent reward rows per ledger, oldest first
    pub recent_rewards: BTreeMap<Address, VecDeque<RewardRow>>,
}

impl AggregateState {
    /// Create an empty state for the given chain
    pub fn new(chain: ChainId) -> Self {
        Self { chain, ..Default::default() }
    }

    /// Append a reward row, retaining at most `limit` rows for its ledger
    pub fn push_reward_row(&mut self, row: RewardRow, limit: usize) {
        let rows = self.recent_rewards.entry(row.ledger).or_default();
        rows.push_back(row);
        while rows.len() > limit {
            rows.pop_front();
        }
    }

    /// Replace the recent reward history with the given rows, in any order
    pub fn hydrate_recent_rewards(&mut self, mut rows: Vec<RewardRow>) {
        rows.sort_by_key(|row| (row.ledger, row.block_number));
        self.recent_rewards.clear();
        for row in rows {
            self.recent_rewards.entry(row.ledger).or_default().push_back(row);
        }
    }
}
