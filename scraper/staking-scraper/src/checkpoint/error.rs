//! Error types for checkpoint stores

use crate::db::error::DbError;

/// The error type emitted by a checkpoint store
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// An error in the database client
    #[error("database error: {0}")]
    Db(#[from] DbError),
    /// A stored value could not be converted into its domain type
    #[error("conversion error: {0}")]
    Conversion(String),
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[allow(clippy::needless_pass_by_value)]
impl CheckpointError {
    /// Create a new conversion error
    pub fn conversion<T: ToString>(msg: T) -> Self {
        Self::Conversion(msg.to_string())
    }

    /// Create a new unavailability error
    pub fn unavailable<T: ToString>(msg: T) -> Self {
        Self::Unavailable(msg.to_string())
    }
}

impl From<diesel::result::Error> for CheckpointError {
    fn from(error: diesel::result::Error) -> Self {
        CheckpointError::Db(DbError::from(error))
    }
}
