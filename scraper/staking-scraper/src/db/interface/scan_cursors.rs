//! Interface methods for interacting with the scan cursors table

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, sql_query};
use diesel_async::RunQueryDsl;

use crate::{
    db::{
        client::{DbClient, DbConn},
        error::DbError,
        models::ScanCursorModel,
        schema::scan_cursors,
    },
    types::{ChainId, ScanCursor, ScanTargetId},
};

/// Advances a cursor only if the stored cursor is strictly behind it
const ADVANCE_CURSOR_QUERY: &str = r#"
    INSERT INTO scan_cursors (chain, target, last_processed_block, last_processed_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (chain, target) DO UPDATE
    SET last_processed_block = EXCLUDED.last_processed_block,
        last_processed_at = EXCLUDED.last_processed_at
    WHERE scan_cursors.last_processed_block < EXCLUDED.last_processed_block
"#;

impl DbClient {
    // -----------
    // | Setters |
    // -----------

    /// Advance a scan cursor, returning whether the stored cursor moved
    pub async fn advance_scan_cursor(
        &self,
        cursor: &ScanCursor,
        conn: &mut DbConn<'_>,
    ) -> Result<bool, DbError> {
        let model = ScanCursorModel::try_from(cursor)?;

        let updated = sql_query(ADVANCE_CURSOR_QUERY)
            .bind::<diesel::sql_types::Text, _>(model.chain)
            .bind::<diesel::sql_types::Text, _>(model.target)
            .bind::<diesel::sql_types::BigInt, _>(model.last_processed_block)
            .bind::<diesel::sql_types::Timestamptz, _>(model.last_processed_at)
            .execute(conn)
            .await
            .map_err(DbError::from)?;

        Ok(updated > 0)
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the cursor of a scan loop, if it has ever committed
    pub async fn get_scan_cursor(
        &self,
        chain: ChainId,
        target: ScanTargetId,
        conn: &mut DbConn<'_>,
    ) -> Result<Option<ScanCursor>, DbError> {
        scan_cursors::table
            .filter(scan_cursors::chain.eq(chain.as_str()))
            .filter(scan_cursors::target.eq(target.as_str()))
            .select(ScanCursorModel::as_select())
            .first(conn)
            .await
            .optional()
            .map_err(DbError::from)?
            .map(ScanCursor::try_from)
            .transpose()
    }
}
