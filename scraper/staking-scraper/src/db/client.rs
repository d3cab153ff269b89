//! A client for interacting with the scraper's database

use std::{sync::Arc, time::Duration};

use bb8::{Pool, PooledConnection};
use diesel::ConnectionError;
use diesel_async::{
    AsyncMigrationHarness, AsyncPgConnection,
    pooled_connection::{AsyncDieselConnectionManager, ManagerConfig},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tracing::{error, info};

use crate::db::error::DbError;

/// The schema migrations of the scraper database
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
/// The time allowed for the pool to hand out a connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ---------
// | Types |
// ---------

/// The DB connection type
pub type DbConn<'a> = PooledConnection<'a, AsyncDieselConnectionManager<AsyncPgConnection>>;
/// The DB pool type
pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

// ----------
// | Client |
// ----------

/// A client for the scraper database
#[derive(Clone)]
pub struct DbClient {
    /// The database connection pool
    db_pool: Arc<DbPool>,
}

impl DbClient {
    /// Create a new database client using the provided database URL, holding
    /// at most `pool_size` connections
    pub async fn new(db_url: &str, pool_size: u32) -> Result<Self, DbError> {
        let mut conf = ManagerConfig::default();
        conf.custom_setup = Box::new(move |url| Box::pin(Self::establish_connection(url)));

        let manager = AsyncDieselConnectionManager::new_with_config(db_url, conf);
        let db_pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .await
            .map_err(DbError::client_setup)?;

        Ok(Self { db_pool: Arc::new(db_pool) })
    }

    /// Establish a connection to the database
    async fn establish_connection(db_url: &str) -> Result<AsyncPgConnection, ConnectionError> {
        // Certificates are not validated, the database is reached within a
        // private network
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        let connector = MakeTlsConnector::new(connector);
        let (client, conn) = tokio_postgres::connect(db_url, connector)
            .await
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        // Spawn the connection handle in a separate task
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!("Database connection error: {}", e);
            }
        });

        AsyncPgConnection::try_from(client).await
    }

    /// Get a connection from the pool
    pub async fn get_db_conn(&self) -> Result<DbConn<'_>, DbError> {
        self.db_pool.get().await.map_err(DbError::pool_connection)
    }

    /// Apply any pending schema migrations
    ///
    /// The harness blocks on the async connection, so this must run on a
    /// multi-threaded runtime.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let conn = self.db_pool.get_owned().await.map_err(DbError::pool_connection)?;
        let mut harness = AsyncMigrationHarness::new(conn);
        let applied = harness.run_pending_migrations(MIGRATIONS).map_err(DbError::migration)?;

        info!(applied = applied.len(), "applied database migrations");
        Ok(())
    }
}
