//! Database error definitions

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// An error setting up the database client
    #[error("client setup error: {0}")]
    ClientSetup(String),
    /// An error obtaining a connection from the pool
    #[error("pool connection error: {0}")]
    PoolConnection(String),
    /// A failed query
    #[error("query error: {0}")]
    Query(String),
    /// A stored value that does not fit its domain type
    #[error("conversion error: {0}")]
    Conversion(String),
    /// An error applying the schema migrations
    #[error("migration error: {0}")]
    Migration(String),
}

#[allow(clippy::needless_pass_by_value)]
impl DbError {
    /// Create a new database client setup error
    pub fn client_setup<T: ToString>(msg: T) -> Self {
        Self::ClientSetup(msg.to_string())
    }

    /// Create a new pool connection error
    pub fn pool_connection<T: ToString>(msg: T) -> Self {
        Self::PoolConnection(msg.to_string())
    }

    /// Create a new query error
    pub fn query<T: ToString>(msg: T) -> Self {
        Self::Query(msg.to_string())
    }

    /// Create a new conversion error
    pub fn conversion<T: ToString>(msg: T) -> Self {
        Self::Conversion(msg.to_string())
    }

    /// Create a new migration error
    pub fn migration<T: ToString>(msg: T) -> Self {
        Self::Migration(msg.to_string())
    }
}

impl From<diesel::result::Error> for DbError {
    fn from(error: diesel::result::Error) -> Self {
        DbError::query(error)
    }
}
