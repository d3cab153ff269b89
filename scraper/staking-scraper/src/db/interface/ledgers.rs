//! Interface methods for interacting with the parachain and relay chain
//! ledger tables

use diesel::{QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;

use crate::{
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::{LedgerModel, RelayLedgerModel},
        schema::{ledgers, relay_ledgers},
    },
    types::{LedgerRecord, RelayLedgerRecord},
};

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Insert or overwrite parachain ledger records
    pub async fn upsert_ledgers(
        &self,
        records: &[LedgerRecord],
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        for record in records {
            let model = LedgerModel::from(record);
            diesel::insert_into(ledgers::table)
                .values(&model)
                .on_conflict(ledgers::ledger)
                .do_update()
                .set(&model)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
        }

        Ok(())
    }

    /// Insert or overwrite relay chain ledger records
    pub async fn upsert_relay_ledgers(
        &self,
        records: &[RelayLedgerRecord],
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        for record in records {
            let model = RelayLedgerModel::try_from(record)?;
            diesel::insert_into(relay_ledgers::table)
                .values(&model)
                .on_conflict(relay_ledgers::ledger)
                .do_update()
                .set(&model)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
        }

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get every parachain ledger record
    pub async fn get_ledgers(&self, conn: &mut DbConn<'_>) -> Result<Vec<LedgerRecord>, DbError> {
        let models: Vec<LedgerModel> = ledgers::table
            .select(LedgerModel::as_select())
            .load(conn)
            .await
            .map_err(DbError::from)?;

        models.into_iter().map(LedgerRecord::try_from).collect()
    }

    /// Get every relay chain ledger record
    pub async fn get_relay_ledgers(
        &self,
        conn: &mut DbConn<'_>,
    ) -> Result<Vec<RelayLedgerRecord>, DbError> {
        let models: Vec<RelayLedgerModel> = relay_ledgers::table
            .select(RelayLedgerModel::as_select())
            .load(conn)
            .await
            .map_err(DbError::from)?;

        models.into_iter().map(RelayLedgerRecord::try_from).collect()
    }
}
