//! Interface methods for interacting with the validators info table

use diesel::{QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;

use crate::{
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::ValidatorsInfoModel,
        schema::validators_info,
    },
    types::ValidatorsInfo,
};

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Replace the full validators info set
    pub async fn replace_validators_info(
        &self,
        infos: &[ValidatorsInfo],
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        diesel::delete(validators_info::table).execute(conn).await.map_err(DbError::from)?;
        if infos.is_empty() {
            return Ok(());
        }

        let models: Vec<ValidatorsInfoModel> = infos.iter().map(ValidatorsInfoModel::from).collect();
        diesel::insert_into(validators_info::table)
            .values(models)
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the current validators info set
    pub async fn get_validators_info(
        &self,
        conn: &mut DbConn<'_>,
    ) -> Result<Vec<ValidatorsInfo>, DbError> {
        let models: Vec<ValidatorsInfoModel> = validators_info::table
            .select(ValidatorsInfoModel::as_select())
            .load(conn)
            .await
            .map_err(DbError::from)?;

        models.into_iter().map(ValidatorsInfo::try_from).collect()
    }
}
