//! Radar violation pipeline domain logic.
//!
//! Everything in this crate is free of database and socket code:
//!
//! - [`parser`]: decodes binary, JSON and text radar datagrams.
//! - [`dedup`]: bounded recency cache that suppresses retransmissions.
//! - [`fine`]: tiered fine schedule.
//! - [`correlation`]: time-window matching of violations to captures.
//! - [`ports`]: async traits for the persistence collaborators.

pub mod correlation;
pub mod dedup;
pub mod error;
pub mod fine;
pub mod parser;
pub mod ports;
pub mod reading;
pub mod types;
