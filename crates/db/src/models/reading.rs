use radarops_core::reading::MessageFormat;
use radarops_core::types::{DbId, RadarId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `radar_readings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RadarReading {
    pub id: DbId,
    pub radar_id: RadarId,
    pub speed_detected: i32,
    pub speed_limit: i32,
    pub detected_at: Timestamp,
    pub is_violation: bool,
    pub source_address: String,
    pub raw_payload: String,
    pub message_format: String,
    pub correlated_image_refs: Option<Vec<String>>,
    pub fine_id: Option<DbId>,
    pub processed: bool,
    pub processing_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RadarReading {
    pub fn format(&self) -> MessageFormat {
        MessageFormat::from_db(&self.message_format)
    }
}
