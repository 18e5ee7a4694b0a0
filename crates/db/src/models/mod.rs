//! Row structs for the pipeline tables.
//!
//! Each submodule holds a `FromRow` + `Serialize` entity matching the
//! database row. Insert DTOs live in `radarops-core`.

pub mod capture;
pub mod fine;
pub mod radar;
pub mod reading;
pub mod status;
