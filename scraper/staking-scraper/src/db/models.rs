//! Type bindings for the scraper's database table records

use std::str::FromStr;

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::{
    QueryableByName, Selectable,
    prelude::{AsChangeset, Insertable, Queryable},
};

use crate::{
    checkpoint::AggregateDelta,
    db::{
        error::DbError,
        utils::{
            bigdecimal_to_i256, bigdecimal_to_u256, i64_to_u64, i256_to_bigdecimal,
            u64_to_i64, u256_to_bigdecimal,
        },
    },
    types::{
        AggregateState, ChainId, LedgerRecord, LedgerStatus, RelayAggregates, RelayLedgerRecord,
        RewardRow, ScanCursor, ScanTargetId, ValidatorsInfo,
    },
};

// ----------------
// | Table Models |
// ----------------

// === Scan Cursors Table ===

/// A scan cursor record
#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::db::schema::scan_cursors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScanCursorModel {
    /// The scanned chain
    pub chain: String,
    /// The scan target
    pub target: String,
    /// The last committed block
    pub last_processed_block: i64,
    /// The time of the last commit
    pub last_processed_at: DateTime<Utc>,
}

impl TryFrom<&ScanCursor> for ScanCursorModel {
    type Error = DbError;

    fn try_from(cursor: &ScanCursor) -> Result<Self, DbError> {
        Ok(ScanCursorModel {
            chain: cursor.chain.as_str().to_string(),
            target: cursor.target.as_str().to_string(),
            last_processed_block: u64_to_i64(cursor.last_processed_block)?,
            last_processed_at: cursor.last_processed_at,
        })
    }
}

impl TryFrom<ScanCursorModel> for ScanCursor {
    type Error = DbError;

    fn try_from(model: ScanCursorModel) -> Result<Self, DbError> {
        Ok(ScanCursor {
            chain: parse_chain(&model.chain)?,
            target: ScanTargetId::parse(&model.target)
                .ok_or_else(|| DbError::conversion(format!("unknown scan target {}", model.target)))?,
            last_processed_block: i64_to_u64(model.last_processed_block)?,
            last_processed_at: model.last_processed_at,
        })
    }
}

// === Aggregates Table ===

/// An aggregate state record
#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::db::schema::aggregates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AggregateModel {
    /// The chain owning the row
    pub chain: String,
    /// The nToken total supply
    pub total_supply: BigDecimal,
    /// The total supply in USD
    pub total_supply_usd: Option<f64>,
    /// The contract's buffered deposits
    pub contract_buffered_deposits: BigDecimal,
    /// The contract's buffered redeems
    pub contract_buffered_redeems: BigDecimal,
    /// The OracleMaster era
    pub era_id: Option<i64>,
    /// The OracleMaster current era
    pub current_era_id: Option<i64>,
    /// The OracleMaster next era start time
    pub next_era_start_time: Option<i64>,
    /// The relay chain active era
    pub relay_active_era_id: Option<i64>,
    /// The relay chain next era start time
    pub relay_next_era_start_time: Option<i64>,
    /// The relay chain validator count
    pub relay_validators_count: Option<i64>,
    /// The relay chain total stake
    pub relay_total_staked: BigDecimal,
    /// The relay chain total issuance
    pub relay_total_issuance: BigDecimal,
    /// The monthly APR
    pub apr_per_month: f64,
    /// The weekly APR
    pub apr_per_week: f64,
    /// The inflation rate
    pub inflation_rate: f64,
    /// The estimated APY
    pub estimated_apy: f64,
    /// Buffered deposits
    pub buffered_deposits: BigDecimal,
    /// Buffered redeems
    pub buffered_redeems: BigDecimal,
    /// Deposit total
    pub deposited: BigDecimal,
    /// Redeem total
    pub redeemed: BigDecimal,
    /// Deposit count
    pub deposited_count: i64,
    /// Redeem count
    pub redeemed_count: i64,
    /// Reward total
    pub rewards_aggregated: BigDecimal,
    /// Loss total
    pub losses_aggregated: BigDecimal,
    /// Holder count
    pub holders_number: i64,
    /// The last block with events
    pub last_block_with_events: Option<i64>,
    /// The APR over recent reports
    pub apr: f64,
}

impl AggregateModel {
    /// Convert the row into an aggregate state without its child tables
    pub fn into_state(self) -> Result<AggregateState, DbError> {
        Ok(AggregateState {
            chain: parse_chain(&self.chain)?,
            total_supply: bigdecimal_to_u256(&self.total_supply)?,
            total_supply_usd: self.total_supply_usd,
            contract_buffered_deposits: bigdecimal_to_u256(&self.contract_buffered_deposits)?,
            contract_buffered_redeems: bigdecimal_to_u256(&self.contract_buffered_redeems)?,
            era_id: self.era_id.map(i64_to_u64).transpose()?,
            current_era_id: self.current_era_id.map(i64_to_u64).transpose()?,
            next_era_start_time: self.next_era_start_time,
            relay: RelayAggregates {
                active_era_id: self.relay_active_era_id.map(i64_to_u64).transpose()?,
                next_era_start_time: self.relay_next_era_start_time,
                validators_count: self.relay_validators_count.map(i64_to_u64).transpose()?,
                total_staked: bigdecimal_to_u256(&self.relay_total_staked)?,
                total_issuance: bigdecimal_to_u256(&self.relay_total_issuance)?,
            },
            apr_per_month: self.apr_per_month,
            apr_per_week: self.apr_per_week,
            inflation_rate: self.inflation_rate,
            estimated_apy: self.estimated_apy,
            buffered_deposits: bigdecimal_to_u256(&self.buffered_deposits)?,
            buffered_redeems: bigdecimal_to_u256(&self.buffered_redeems)?,
            deposited: bigdecimal_to_u256(&self.deposited)?,
            redeemed: bigdecimal_to_u256(&self.redeemed)?,
            deposited_count: i64_to_u64(self.deposited_count)?,
            redeemed_count: i64_to_u64(self.redeemed_count)?,
            rewards_aggregated: bigdecimal_to_u256(&self.rewards_aggregated)?,
            losses_aggregated: bigdecimal_to_u256(&self.losses_aggregated)?,
            holders_number: i64_to_u64(self.holders_number)?,
            last_block_with_events: self.last_block_with_events.map(i64_to_u64).transpose()?,
            apr: self.apr,
            ..Default::default()
        })
    }
}

/// A fresh aggregate row
#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::aggregates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewAggregateModel {
    /// The chain owning the row
    pub chain: String,
}

/// The overwritten columns of an aggregate row, `None` columns are untouched
#[derive(AsChangeset, Default, PartialEq)]
#[diesel(table_name = crate::db::schema::aggregates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AggregateOverwritesModel {
    /// The nToken total supply
    pub total_supply: Option<BigDecimal>,
    /// The total supply in USD
    pub total_supply_usd: Option<f64>,
    /// The OracleMaster era
    pub era_id: Option<i64>,
    /// The OracleMaster current era
    pub current_era_id: Option<i64>,
    /// The OracleMaster next era start time
    pub next_era_start_time: Option<i64>,
    /// The relay chain active era
    pub relay_active_era_id: Option<i64>,
    /// The relay chain next era start time
    pub relay_next_era_start_time: Option<i64>,
    /// The relay chain validator count
    pub relay_validators_count: Option<i64>,
    /// The relay chain total stake
    pub relay_total_staked: Option<BigDecimal>,
    /// The relay chain total issuance
    pub relay_total_issuance: Option<BigDecimal>,
    /// The monthly APR
    pub apr_per_month: Option<f64>,
    /// The weekly APR
    pub apr_per_week: Option<f64>,
    /// The inflation rate
    pub inflation_rate: Option<f64>,
    /// The estimated APY
    pub estimated_apy: Option<f64>,
    /// The contract's buffered deposits
    pub contract_buffered_deposits: Option<BigDecimal>,
    /// The contract's buffered redeems
    pub contract_buffered_redeems: Option<BigDecimal>,
    /// Holder count
    pub holders_number: Option<i64>,
    /// The last block with events
    pub last_block_with_events: Option<i64>,
    /// The APR over recent reports
    pub apr: Option<f64>,
}

impl AggregateOverwritesModel {
    /// Collect the overwritten columns of a delta
    pub fn from_delta(delta: &AggregateDelta) -> Result<Self, DbError> {
        let s = &delta.scalars;
        Ok(AggregateOverwritesModel {
            total_supply: s.total_supply.map(u256_to_bigdecimal),
            total_supply_usd: s.total_supply_usd,
            era_id: s.era_id.map(u64_to_i64).transpose()?,
            current_era_id: s.current_era_id.map(u64_to_i64).transpose()?,
            next_era_start_time: s.next_era_start_time,
            relay_active_era_id: s.relay_active_era_id.map(u64_to_i64).transpose()?,
            relay_next_era_start_time: s.relay_next_era_start_time,
            relay_validators_count: s.relay_validators_count.map(u64_to_i64).transpose()?,
            relay_total_staked: s.relay_total_staked.map(u256_to_bigdecimal),
            relay_total_issuance: s.relay_total_issuance.map(u256_to_bigdecimal),
            apr_per_month: s.apr_per_month,
            apr_per_week: s.apr_per_week,
            inflation_rate: s.inflation_rate,
            estimated_apy: s.estimated_apy,
            contract_buffered_deposits: s.contract_buffered_deposits.map(u256_to_bigdecimal),
            contract_buffered_redeems: s.contract_buffered_redeems.map(u256_to_bigdecimal),
            holders_number: delta.holders_number.map(u64_to_i64).transpose()?,
            last_block_with_events: s.last_block_with_events.map(u64_to_i64).transpose()?,
            apr: s.apr,
        })
    }

    /// Whether no column is overwritten
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// === Holders Table ===

/// A holder balance record
#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::db::schema::holders)]
#[diesel(primary_key(chain, address))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HolderModel {
    /// The chain of the token
    pub chain: String,
    /// The holder address
    pub address: String,
    /// The tracked balance
    pub balance: BigDecimal,
}

// === Rewards Table ===

/// A reward row to insert
#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::rewards)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRewardModel {
    /// The reporting ledger
    pub ledger: String,
    /// The signed reward
    pub reward: BigDecimal,
    /// The ledger balance after the report
    pub balance: BigDecimal,
    /// The block of the report
    pub block_number: i64,
}

impl TryFrom<&RewardRow> for NewRewardModel {
    type Error = DbError;

    fn try_from(row: &RewardRow) -> Result<Self, DbError> {
        Ok(NewRewardModel {
            ledger: row.ledger.to_string(),
            reward: i256_to_bigdecimal(row.reward),
            balance: u256_to_bigdecimal(row.balance),
            block_number: u64_to_i64(row.block_number)?,
        })
    }
}

/// A reward row read through the recent rewards query
#[derive(QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RewardRowModel {
    /// The reporting ledger
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub ledger: String,
    /// The signed reward
    #[diesel(sql_type = diesel::sql_types::Numeric)]
    pub reward: BigDecimal,
    /// The ledger balance after the report
    #[diesel(sql_type = diesel::sql_types::Numeric)]
    pub balance: BigDecimal,
    /// The block of the report
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub block_number: i64,
}

impl TryFrom<RewardRowModel> for RewardRow {
    type Error = DbError;

    fn try_from(model: RewardRowModel) -> Result<Self, DbError> {
        Ok(RewardRow {
            ledger: parse_address(&model.ledger)?,
            reward: bigdecimal_to_i256(&model.reward)?,
            balance: bigdecimal_to_u256(&model.balance)?,
            block_number: i64_to_u64(model.block_number)?,
        })
    }
}

// === Ledgers Table ===

/// A parachain ledger record
#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::db::schema::ledgers)]
#[diesel(primary_key(ledger))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LedgerModel {
    /// The ledger contract address
    pub ledger: String,
    /// The active balance
    pub active_balance: BigDecimal,
    /// The cached total balance
    pub cached_total_balance: BigDecimal,
    /// The locked balance
    pub locked_balance: BigDecimal,
    /// The status code
    pub status: i16,
    /// The total balance
    pub total_balance: BigDecimal,
    /// The downward transfer balance
    pub transfer_downward_balance: BigDecimal,
    /// The upward transfer balance
    pub transfer_upward_balance: BigDecimal,
    /// The Nimbus stake
    pub stake: BigDecimal,
    /// The Nimbus borrow
    pub borrow: BigDecimal,
    /// The xcToken balance
    pub xctoken_balance: BigDecimal,
}

impl From<&LedgerRecord> for LedgerModel {
    fn from(record: &LedgerRecord) -> Self {
        LedgerModel {
            ledger: record.ledger.to_string(),
            active_balance: u256_to_bigdecimal(record.active_balance),
            cached_total_balance: u256_to_bigdecimal(record.cached_total_balance),
            locked_balance: u256_to_bigdecimal(record.locked_balance),
            status: i16::from(record.status.code()),
            total_balance: u256_to_bigdecimal(record.total_balance),
            transfer_downward_balance: u256_to_bigdecimal(record.transfer_downward_balance),
            transfer_upward_balance: u256_to_bigdecimal(record.transfer_upward_balance),
            stake: u256_to_bigdecimal(record.stake),
            borrow: u256_to_bigdecimal(record.borrow),
            xctoken_balance: u256_to_bigdecimal(record.xctoken_balance),
        }
    }
}

impl TryFrom<LedgerModel> for LedgerRecord {
    type Error = DbError;

    fn try_from(model: LedgerModel) -> Result<Self, DbError> {
        Ok(LedgerRecord {
            ledger: parse_address(&model.ledger)?,
            active_balance: bigdecimal_to_u256(&model.active_balance)?,
            cached_total_balance: bigdecimal_to_u256(&model.cached_total_balance)?,
            locked_balance: bigdecimal_to_u256(&model.locked_balance)?,
            status: parse_status(model.status)?,
            total_balance: bigdecimal_to_u256(&model.total_balance)?,
            transfer_downward_balance: bigdecimal_to_u256(&model.transfer_downward_balance)?,
            transfer_upward_balance: bigdecimal_to_u256(&model.transfer_upward_balance)?,
            stake: bigdecimal_to_u256(&model.stake)?,
            borrow: bigdecimal_to_u256(&model.borrow)?,
            xctoken_balance: bigdecimal_to_u256(&model.xctoken_balance)?,
        })
    }
}

// === Relay Ledgers Table ===

/// A relay chain ledger record
#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::db::schema::relay_ledgers)]
#[diesel(primary_key(ledger))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RelayLedgerModel {
    /// The parachain ledger contract address
    pub ledger: String,
    /// The ss58 stash address
    pub stash: String,
    /// The active bonded balance
    pub active_balance: BigDecimal,
    /// The total bonded balance
    pub total_balance: BigDecimal,
    /// The free stash balance
    pub stash_balance: BigDecimal,
    /// The stake status code
    pub stake_status: i16,
    /// The nominated validator count
    pub validators_count: i64,
    /// The unlocking total
    pub total_unlocking_balance: BigDecimal,
    /// The earliest unlocking era
    pub earliest_era_for_unlocking: i64,
}

impl TryFrom<&RelayLedgerRecord> for RelayLedgerModel {
    type Error = DbError;

    fn try_from(record: &RelayLedgerRecord) -> Result<Self, DbError> {
        Ok(RelayLedgerModel {
            ledger: record.ledger.to_string(),
            stash: record.stash.clone(),
            active_balance: u256_to_bigdecimal(record.active_balance),
            total_balance: u256_to_bigdecimal(record.total_balance),
            stash_balance: u256_to_bigdecimal(record.stash_balance),
            stake_status: i16::from(record.stake_status.code()),
            validators_count: u64_to_i64(record.validators_count)?,
            total_unlocking_balance: u256_to_bigdecimal(record.total_unlocking_balance),
            earliest_era_for_unlocking: u64_to_i64(record.earliest_era_for_unlocking)?,
        })
    }
}

impl TryFrom<RelayLedgerModel> for RelayLedgerRecord {
    type Error = DbError;

    fn try_from(model: RelayLedgerModel) -> Result<Self, DbError> {
        Ok(RelayLedgerRecord {
            ledger: parse_address(&model.ledger)?,
            stash: model.stash,
            active_balance: bigdecimal_to_u256(&model.active_balance)?,
            total_balance: bigdecimal_to_u256(&model.total_balance)?,
            stash_balance: bigdecimal_to_u256(&model.stash_balance)?,
            stake_status: parse_status(model.stake_status)?,
            validators_count: i64_to_u64(model.validators_count)?,
            total_unlocking_balance: bigdecimal_to_u256(&model.total_unlocking_balance)?,
            earliest_era_for_unlocking: i64_to_u64(model.earliest_era_for_unlocking)?,
        })
    }
}

// === Validators Info Table ===

/// A validators info record
#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::db::schema::validators_info)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ValidatorsInfoModel {
    /// The parachain ledger contract address
    pub ledger: String,
    /// The ss58 stash address
    pub stash: String,
    /// The Nimbus stake of the ledger
    pub active_stake: BigDecimal,
    /// The ss58 addresses of the nominated validators
    pub validators: Vec<String>,
}

impl From<&ValidatorsInfo> for ValidatorsInfoModel {
    fn from(info: &ValidatorsInfo) -> Self {
        ValidatorsInfoModel {
            ledger: info.ledger.to_string(),
            stash: info.stash.clone(),
            active_stake: u256_to_bigdecimal(info.active_stake),
            validators: info.validators.clone(),
        }
    }
}

impl TryFrom<ValidatorsInfoModel> for ValidatorsInfo {
    type Error = DbError;

    fn try_from(model: ValidatorsInfoModel) -> Result<Self, DbError> {
        Ok(ValidatorsInfo {
            ledger: parse_address(&model.ledger)?,
            stash: model.stash,
            active_stake: bigdecimal_to_u256(&model.active_stake)?,
            validators: model.validators,
        })
    }
}

// === Token Prices ===

/// A token price read from the price collector's database
#[derive(QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TokenPriceModel {
    /// The token price in USD
    #[diesel(sql_type = diesel::sql_types::Double)]
    pub price: f64,
}

// -----------
// | Helpers |
// -----------

/// Parse a stored chain identifier
pub fn parse_chain(chain: &str) -> Result<ChainId, DbError> {
    ChainId::parse(chain).ok_or_else(|| DbError::conversion(format!("unknown chain {chain}")))
}

/// Parse a stored address
pub fn parse_address(address: &str) -> Result<Address, DbError> {
    Address::from_str(address).map_err(|e| DbError::conversion(format!("invalid address {address}: {e}")))
}

/// Parse a stored ledger status code
fn parse_status(code: i16) -> Result<LedgerStatus, DbError> {
    u8::try_from(code)
        .ok()
        .and_then(LedgerStatus::from_code)
        .ok_or_else(|| DbError::conversion(format!("unknown ledger status {code}")))
}
