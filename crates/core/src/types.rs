/// Database primary keys for readings, fines and captures are BIGSERIAL.
pub type DbId = i64;

/// Radars are addressed by the small integer they report on the wire.
pub type RadarId = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
