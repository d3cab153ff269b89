//! High-level interfaces for interacting with scraper database tables

pub mod aggregates;
pub mod holders;
pub mod ledgers;
pub mod rewards;
pub mod scan_cursors;
pub mod token_prices;
pub mod validators_info;
