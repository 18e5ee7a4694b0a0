use radarops_core::ports::CaptureCandidate;
use radarops_core::types::{DbId, RadarId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `captures` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Capture {
    pub id: DbId,
    pub image_ref: String,
    pub radar_id: Option<RadarId>,
    pub captured_at: Timestamp,
    pub plate_text: Option<String>,
    pub confidence: Option<f32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Capture> for CaptureCandidate {
    fn from(row: Capture) -> Self {
        Self {
            image_ref: row.image_ref,
            radar_id: row.radar_id,
            captured_at: row.captured_at,
            plate_text: row.plate_text,
            confidence: row.confidence,
        }
    }
}
