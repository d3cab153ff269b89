//! Metric names and tags

// ----------------
// | METRIC NAMES |
// ----------------

/// Metric describing the average APR of the ledgers, in percent
pub const APR: &str = "apr";
/// Metric describing the APR over the last month of reward reports
pub const APR_PER_MONTH: &str = "apr_per_month";
/// Metric describing the APR over the last week of reward reports
pub const APR_PER_WEEK: &str = "apr_per_week";
/// Metric describing the number of nToken holders
pub const HOLDERS_NUMBER: &str = "holders_number";
/// Metric describing the relay chain inflation rate
pub const INFLATION_RATE: &str = "inflation_rate";
/// Metric describing the estimated staking APY
pub const ESTIMATED_APY: &str = "estimated_apy";

/// Metric describing the nToken total supply
pub const NIMBUS_TOTAL_SUPPLY: &str = "nimbus_total_supply";
/// Metric describing the nToken total supply valued in USD
pub const NIMBUS_TOTAL_SUPPLY_USD: &str = "nimbus_total_supply_usd";
/// Metric describing the nTokens held by Nimbus itself
pub const NIMBUS_TOKENS: &str = "nimbus_tokens";
/// Metric describing the deposits buffered in Nimbus
pub const NIMBUS_BUFFERED_DEPOSITS: &str = "nimbus_buffered_deposits";
/// Metric describing the redeems buffered in Nimbus
pub const NIMBUS_BUFFERED_REDEEMS: &str = "nimbus_buffered_redeems";
/// Metric describing the sum of deposited amounts
pub const NIMBUS_DEPOSITS: &str = "nimbus_deposits";
/// Metric describing the sum of redeemed amounts
pub const NIMBUS_REDEEMS: &str = "nimbus_redeems";
/// Metric describing the number of Deposited events
pub const NIMBUS_DEPOSITED_EVENTS_NUMBER: &str = "nimbus_deposited_events_number";
/// Metric describing the number of Redeemed events
pub const NIMBUS_REDEEMED_EVENTS_NUMBER: &str = "nimbus_redeemed_events_number";
/// Metric describing the sum of reported rewards
pub const NIMBUS_REWARDS_AGGREGATED: &str = "nimbus_rewards_aggregated";
/// Metric describing the sum of reported losses
pub const NIMBUS_LOSSES_AGGREGATED: &str = "nimbus_losses_aggregated";

/// Metric describing the xcToken balance of the Controller
pub const CONTROLLER_BALANCE: &str = "controller_balance";
/// Metric describing the native balance of an oracle member
pub const ORACLE_SERVICE_BALANCE: &str = "oracle_service_balance";
/// Metric describing the start time of the OracleMaster's next era
pub const ORACLE_MASTER_NEXT_ERA_START_TIME: &str = "oracle_master_next_era_start_time";
/// Metric describing the OracleMaster's current era
pub const ORACLE_MASTER_CURRENT_ERA_ID: &str = "oracle_master_current_era_id";
/// Metric describing the last era reported to the OracleMaster
pub const ORACLE_MASTER_ERA_ID: &str = "oracle_master_era_id";

/// Metric describing the last parachain block scanned
pub const PARACHAIN_BLOCK_NUMBER: &str = "parachain_block_number";
/// Metric describing the last parachain block with Nimbus events
pub const PARACHAIN_LAST_BLOCK_NUMBER_WITH_EVENTS: &str =
    "parachain_last_block_number_with_events";
/// Metric describing the sum of the ledgers' Nimbus stake
pub const PARACHAIN_LEDGERS_STAKE: &str = "parachain_ledgers_stake";
/// The prefix of the per-ledger parachain metrics
pub const PARACHAIN_LEDGER_PREFIX: &str = "parachain_ledger_";

/// Metric describing the relay chain's active era
pub const RELAY_CHAIN_ACTIVE_ERA_ID: &str = "relay_chain_active_era_id";
/// Metric describing the start time of the relay chain's next era
pub const RELAY_CHAIN_NEXT_ERA_START_TIME: &str = "relay_chain_next_era_start_time";
/// Metric describing the total stake of the relay chain's active era
pub const RELAY_CHAIN_TOTAL_STAKED_TOKENS: &str = "relay_chain_total_staked_tokens";
/// The prefix of the per-ledger relay chain metrics
pub const RELAY_CHAIN_LEDGER_PREFIX: &str = "relay_chain_ledger_";
/// Metric describing the free balance of the payout account
pub const PAYOUT_SERVICE_BALANCE: &str = "payout_service_balance";
/// Metric describing the number of validators nominated by a ledger
pub const VALIDATORS_COUNT: &str = "validators_count";

/// Metric describing the xcToken balance of the Withdrawal contract
pub const WITHDRAWAL_TOKENS: &str = "withdrawal_tokens";
/// Metric describing the amount ready to be claimed from Withdrawal
pub const WITHDRAWAL_PENDING_FOR_CLAIMING: &str = "withdrawal_pending_for_claiming";
/// Metric describing the virtual xcToken amount of Withdrawal
pub const WITHDRAWAL_TOTAL_VIRTUAL_XCTOKEN_AMOUNT: &str =
    "withdrawal_total_virtual_xctoken_amount";
/// Metric describing the xcToken pool shares of Withdrawal
pub const WITHDRAWAL_TOTAL_XCTOKEN_POOL_SHARES: &str = "withdrawal_total_xctoken_pool_shares";

/// The prefix of the per-loop connectivity alerts
pub const ALERT_NOT_CONNECTED_PREFIX: &str = "alert_not_connected_";
/// Metric set while no token price is known
pub const ALERT_TOKEN_PRICE_IS_NONE: &str = "alert_token_price_is_none";
/// Metric describing the number of healthy endpoints of a chain
pub const ENDPOINT_POOL_HEALTHY_ENDPOINTS: &str = "endpoint_pool_healthy_endpoints";

// ---------------
// | METRIC TAGS |
// ---------------

/// Tag for the ledger contract address
pub const LEDGER_TAG: &str = "ledger";
/// Tag for an account address
pub const ADDRESS_TAG: &str = "address";
/// Tag for the chain
pub const CHAIN_TAG: &str = "chain";
