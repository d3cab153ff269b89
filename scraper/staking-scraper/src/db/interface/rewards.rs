//! Interface methods for interacting with the rewards table

use diesel::sql_query;
use diesel_async::RunQueryDsl;

use crate::{
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::{NewRewardModel, RewardRowModel},
        schema::rewards,
    },
    types::RewardRow,
};

/// Selects the latest `$1` reward rows of every ledger, newest first. Rows
/// sharing a block are ordered by insertion.
const RECENT_REWARDS_QUERY: &str = r#"
    SELECT ledger, reward, balance, block_number
    FROM (
        SELECT ledger, reward, balance, block_number,
            ROW_NUMBER() OVER (PARTITION BY ledger ORDER BY block_number DESC, id DESC) AS row_number
        FROM rewards
    ) ranked
    WHERE row_number <= $1
    ORDER BY ledger, block_number DESC
"#;

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Append reward rows
    pub async fn insert_reward_rows(
        &self,
        rows: &[RewardRow],
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let models = rows.iter().map(NewRewardModel::try_from).collect::<Result<Vec<_>, _>>()?;
        diesel::insert_into(rewards::table)
            .values(models)
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the latest `limit` reward rows of every ledger, newest first
    pub async fn get_recent_rewards(
        &self,
        limit: usize,
        conn: &mut DbConn<'_>,
    ) -> Result<Vec<RewardRow>, DbError> {
        let limit = i64::try_from(limit).map_err(DbError::conversion)?;
        let models: Vec<RewardRowModel> = sql_query(RECENT_REWARDS_QUERY)
            .bind::<diesel::sql_types::BigInt, _>(limit)
            .load(conn)
            .await
            .map_err(DbError::from)?;

        models.into_iter().map(RewardRow::try_from).collect()
    }
}
