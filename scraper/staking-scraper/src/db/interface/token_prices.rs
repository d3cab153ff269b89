//! Reads daily token prices from the price collector's database

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::{OptionalExtension, sql_query};
use diesel_async::RunQueryDsl;

use crate::{
    db::{client::DbClient, error::DbError, models::TokenPriceModel},
    targets::parachain_state::TokenPriceSource,
};

/// The date format of the price collector's tables
const PRICE_DATE_FORMAT: &str = "%d-%m-%Y";

/// A token price source backed by the price collector's database
pub struct TokenPriceReader {
    /// The price collector's database
    db: DbClient,
    /// The token symbol, suffixing the price table name
    symbol: String,
}

impl TokenPriceReader {
    /// Create a new price reader, the symbol must be alphanumeric
    pub fn new(db: DbClient, symbol: &str) -> Result<Self, DbError> {
        Ok(Self { db, symbol: validate_token_symbol(symbol)? })
    }

    /// The query selecting the price of one day
    fn price_query(&self) -> String {
        let table = format!("token_price_{}", self.symbol);
        format!("SELECT price::double precision AS price FROM {table} WHERE {table}.date = $1")
    }
}

/// Check that a token symbol can suffix a table name, returning it lowercased
pub fn validate_token_symbol(symbol: &str) -> Result<String, DbError> {
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DbError::client_setup(format!("invalid token symbol {symbol:?}")));
    }

    Ok(symbol.to_ascii_lowercase())
}

#[async_trait]
impl TokenPriceSource for TokenPriceReader {
    async fn price(&self, date: NaiveDate) -> Result<Option<f64>, DbError> {
        let mut conn = self.db.get_db_conn().await?;
        let row: Option<TokenPriceModel> = sql_query(self.price_query())
            .bind::<diesel::sql_types::Text, _>(date.format(PRICE_DATE_FORMAT).to_string())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(DbError::from)?;

        Ok(row.map(|row| row.price))
    }
}
