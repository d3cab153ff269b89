//! Common utilities for DB tests

use diesel::sql_query;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use postgresql_embedded::PostgreSQL;

use crate::db::{client::DbClient, error::DbError};

// -------------
// | Constants |
// -------------

/// The name of the test database
const TEST_DB_NAME: &str = "scraper_test";
/// The connection pool size of the test client
const TEST_POOL_SIZE: u32 = 4;

// ---------
// | Types |
// ---------

/// A database client over a local PostgreSQL instance
pub struct TestDbClient {
    /// The database client
    pub client: DbClient,
    /// The local PostgreSQL instance
    pub postgres: PostgreSQL,
}

// -----------
// | Helpers |
// -----------

/// Set up a migrated test database on a local PostgreSQL instance
pub async fn setup_test_db_client() -> Result<TestDbClient, DbError> {
    let mut postgres = PostgreSQL::default();

    postgres.setup().await.map_err(DbError::client_setup)?;
    postgres.start().await.map_err(DbError::client_setup)?;
    postgres.create_database(TEST_DB_NAME).await.map_err(DbError::client_setup)?;

    let db_url = postgres.settings().url(TEST_DB_NAME);
    let client = DbClient::new(&db_url, TEST_POOL_SIZE).await?;
    client.run_migrations().await?;

    Ok(TestDbClient { client, postgres })
}

/// Tear down the test database and stop the PostgreSQL instance
pub async fn cleanup_test_db(test_db_client: TestDbClient) -> Result<(), DbError> {
    // Pooled connections are still open, terminate them so the database can be
    // dropped
    let drop_conns_query = r#"
        SELECT pg_terminate_backend(pid)
        FROM pg_stat_activity
        WHERE datname = $1
            AND pid <> pg_backend_pid();
    "#;

    let db_url = test_db_client.postgres.settings().url(TEST_DB_NAME);
    let mut conn = AsyncPgConnection::establish(&db_url).await.map_err(DbError::client_setup)?;
    sql_query(drop_conns_query)
        .bind::<diesel::sql_types::Text, _>(TEST_DB_NAME.to_string())
        .execute(&mut conn)
        .await?;
    drop(conn);

    test_db_client.postgres.drop_database(TEST_DB_NAME).await.map_err(DbError::client_setup)?;
    test_db_client.postgres.stop().await.map_err(DbError::client_setup)
}
