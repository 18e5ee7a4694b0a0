use radarops_core::types::{DbId, RadarId, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `fines` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Fine {
    pub id: DbId,
    pub radar_id: RadarId,
    pub vehicle_plate: Option<String>,
    pub speed_detected: i32,
    pub speed_limit: i32,
    pub violation_amount: i32,
    pub fine_amount: Decimal,
    pub violation_at: Timestamp,
    pub status_id: StatusId,
    pub image_ref: Option<String>,
    pub notes: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
