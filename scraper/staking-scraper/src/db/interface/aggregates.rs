//! Interface methods for interacting with the aggregates table

use bigdecimal::BigDecimal;
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, define_sql_function,
    sql_types::Numeric,
};
use diesel_async::RunQueryDsl;

use crate::{
    checkpoint::delta::CounterIncrements,
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::{AggregateModel, AggregateOverwritesModel, NewAggregateModel},
        schema::aggregates,
        utils::{u64_to_i64, u256_to_bigdecimal},
    },
    types::{AggregateState, ChainId},
};

define_sql_function! {
    /// The larger of two numerics
    fn greatest(x: Numeric, y: Numeric) -> Numeric;
}

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Create the aggregate row of a chain if it does not exist yet
    pub async fn ensure_aggregate_row(
        &self,
        chain: ChainId,
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        diesel::insert_into(aggregates::table)
            .values(NewAggregateModel { chain: chain.as_str().to_string() })
            .on_conflict_do_nothing()
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    /// Overwrite the given columns of a chain's aggregate row
    pub async fn overwrite_aggregates(
        &self,
        chain: ChainId,
        overwrites: &AggregateOverwritesModel,
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        if overwrites.is_empty() {
            return Ok(());
        }

        diesel::update(aggregates::table)
            .filter(aggregates::chain.eq(chain.as_str()))
            .set(overwrites)
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    /// Move a chain's counters by the given increments
    pub async fn increment_aggregates(
        &self,
        chain: ChainId,
        counters: &CounterIncrements,
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        if counters.is_empty() {
            return Ok(());
        }

        diesel::update(aggregates::table)
            .filter(aggregates::chain.eq(chain.as_str()))
            .set((
                aggregates::deposited.eq(aggregates::deposited + u256_to_bigdecimal(counters.deposited)),
                aggregates::redeemed.eq(aggregates::redeemed + u256_to_bigdecimal(counters.redeemed)),
                aggregates::deposited_count
                    .eq(aggregates::deposited_count + u64_to_i64(counters.deposited_count)?),
                aggregates::redeemed_count
                    .eq(aggregates::redeemed_count + u64_to_i64(counters.redeemed_count)?),
                aggregates::rewards_aggregated
                    .eq(aggregates::rewards_aggregated + u256_to_bigdecimal(counters.rewards_aggregated)),
                aggregates::losses_aggregated
                    .eq(aggregates::losses_aggregated + u256_to_bigdecimal(counters.losses_aggregated)),
                aggregates::buffered_deposits
                    .eq(aggregates::buffered_deposits + u256_to_bigdecimal(counters.buffered_deposits)),
                aggregates::buffered_redeems.eq(greatest(
                    aggregates::buffered_redeems - u256_to_bigdecimal(counters.buffered_redeems_drawn),
                    BigDecimal::from(0),
                )),
            ))
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the aggregate row of a chain, without its child tables
    pub async fn get_aggregate_row(
        &self,
        chain: ChainId,
        conn: &mut DbConn<'_>,
    ) -> Result<Option<AggregateState>, DbError> {
        aggregates::table
            .filter(aggregates::chain.eq(chain.as_str()))
            .select(AggregateModel::as_select())
            .first(conn)
            .await
            .optional()
            .map_err(DbError::from)?
            .map(AggregateModel::into_state)
            .transpose()
    }
}
