//! Interface methods for interacting with the holders table

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, upsert::excluded};
use diesel_async::RunQueryDsl;

use crate::{
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::{HolderModel, parse_address},
        schema::holders,
        utils::{bigdecimal_to_u256, u256_to_bigdecimal},
    },
    types::ChainId,
};

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Write absolute holder balances, removing holders whose balance is zero
    pub async fn write_holder_balances(
        &self,
        chain: ChainId,
        balances: &BTreeMap<Address, U256>,
        conn: &mut DbConn<'_>,
    ) -> Result<(), DbError> {
        let (emptied, held): (Vec<_>, Vec<_>) = balances.iter().partition(|(_, balance)| balance.is_zero());

        if !emptied.is_empty() {
            let addresses: Vec<String> = emptied.iter().map(|(address, _)| address.to_string()).collect();
            diesel::delete(holders::table)
                .filter(holders::chain.eq(chain.as_str()))
                .filter(holders::address.eq_any(addresses))
                .execute(conn)
                .await
                .map_err(DbError::from)?;
        }

        if !held.is_empty() {
            let models: Vec<HolderModel> = held
                .iter()
                .map(|(address, balance)| HolderModel {
                    chain: chain.as_str().to_string(),
                    address: address.to_string(),
                    balance: u256_to_bigdecimal(**balance),
                })
                .collect();

            diesel::insert_into(holders::table)
                .values(models)
                .on_conflict((holders::chain, holders::address))
                .do_update()
                .set(holders::balance.eq(excluded(holders::balance)))
                .execute(conn)
                .await
                .map_err(DbError::from)?;
        }

        Ok(())
    }

    // -----------
    // | Getters |
    // -----------

    /// Get every tracked holder balance of a chain
    pub async fn get_holder_balances(
        &self,
        chain: ChainId,
        conn: &mut DbConn<'_>,
    ) -> Result<BTreeMap<Address, U256>, DbError> {
        let models: Vec<HolderModel> = holders::table
            .filter(holders::chain.eq(chain.as_str()))
            .select(HolderModel::as_select())
            .load(conn)
            .await
            .map_err(DbError::from)?;

        models
            .into_iter()
            .map(|model| Ok((parse_address(&model.address)?, bigdecimal_to_u256(&model.balance)?)))
            .collect()
    }
}
