//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod capture_repo;
pub mod fine_repo;
pub mod radar_repo;
pub mod reading_repo;

pub use capture_repo::CaptureRepo;
pub use fine_repo::FineRepo;
pub use radar_repo::RadarRepo;
pub use reading_repo::ReadingRepo;
