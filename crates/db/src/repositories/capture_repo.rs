//! Repository for the `captures` table.

use radarops_core::ports::NewCapture;
use radarops_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::capture::Capture;

/// Column list for `captures` queries.
const COLUMNS: &str = "\
    id, image_ref, radar_id, captured_at, plate_text, confidence, created_at, updated_at";

/// Provides query operations for camera captures.
pub struct CaptureRepo;

impl CaptureRepo {
    /// Insert a capture unless its image ref is already known.
    ///
    /// Returns `true` when a row was inserted.
    pub async fn insert_if_new(pool: &PgPool, capture: &NewCapture) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO captures (image_ref, radar_id, captured_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (image_ref) DO NOTHING",
        )
        .bind(&capture.image_ref)
        .bind(capture.radar_id)
        .bind(capture.captured_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Captures with `start <= captured_at <= end`, ordered by time.
    pub async fn find_in_window(
        pool: &PgPool,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Capture>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM captures \
             WHERE captured_at BETWEEN $1 AND $2 \
             ORDER BY captured_at"
        );
        sqlx::query_as::<_, Capture>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await
    }

    /// Record the plate recogniser's result for a capture.
    ///
    /// Returns `false` when no capture has this image ref.
    pub async fn set_plate(
        pool: &PgPool,
        image_ref: &str,
        plate_text: &str,
        confidence: f32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE captures \
             SET plate_text = $2, confidence = $3, updated_at = NOW() \
             WHERE image_ref = $1",
        )
        .bind(image_ref)
        .bind(plate_text)
        .bind(confidence)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
