use radarops_core::types::{RadarId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `radars` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Radar {
    pub id: RadarId,
    pub name: String,
    pub location: String,
    pub status_id: StatusId,
    pub speed_limit: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
