//! Database schema & interface definitions

#[allow(missing_docs)]
#[allow(clippy::missing_docs_in_private_items)]
pub mod schema;

pub mod checkpoint_store;
pub mod client;
pub mod error;
pub mod interface;
pub mod models;
mod utils;

#[cfg(feature = "integration")]
pub mod test_utils;
