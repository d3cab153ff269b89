//! The concrete scan targets, one per scan loop.
//!
//! Each target reads one kind of chain data and turns it into an aggregate
//! delta for the scanner to commit.

pub mod events;
pub mod parachain_state;
pub mod relay_state;
pub mod validators_info;
