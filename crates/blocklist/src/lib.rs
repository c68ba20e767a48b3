//! Blocklist domain module.
//!
//! This crate contains the business rules for blocking countries, implemented purely
//! as deterministic domain logic (no IO, no clocks, no storage). Every state change
//! is a function returning the new state together with the events it produced.

pub mod country_code;
pub mod entry;

pub use country_code::CountryCode;
pub use entry::{
    BlockEntry, BlockEvent, CountryBlocked, CountryUnblocked, MAX_BLOCK_MINUTES, MAX_NAME_LEN,
    Transition,
};
