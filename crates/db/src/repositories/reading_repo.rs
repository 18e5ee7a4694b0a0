//! Repository for the `radar_readings` table.

use radarops_core::reading::NewRadarReading;
use radarops_core::types::DbId;
use sqlx::PgPool;

use crate::models::reading::RadarReading;

/// Column list for `radar_readings` queries.
const COLUMNS: &str = "\
    id, radar_id, speed_detected, speed_limit, detected_at, is_violation, \
    source_address, raw_payload, message_format, correlated_image_refs, \
    fine_id, processed, processing_notes, created_at, updated_at";

/// Provides query operations for radar readings.
pub struct ReadingRepo;

impl ReadingRepo {
    pub async fn create(
        pool: &PgPool,
        reading: &NewRadarReading,
    ) -> Result<RadarReading, sqlx::Error> {
        let query = format!(
            "INSERT INTO radar_readings \
                (radar_id, speed_detected, speed_limit, detected_at, is_violation, \
                 source_address, raw_payload, message_format, processed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RadarReading>(&query)
            .bind(reading.radar_id)
            .bind(reading.speed_detected)
            .bind(reading.speed_limit)
            .bind(reading.detected_at)
            .bind(reading.is_violation)
            .bind(&reading.source_address)
            .bind(&reading.raw_payload)
            .bind(reading.message_format.as_str())
            .bind(reading.processed)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<RadarReading>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM radar_readings WHERE id = $1");
        sqlx::query_as::<_, RadarReading>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Store the correlated image refs. Returns `false` if no row matched.
    pub async fn attach_images(
        pool: &PgPool,
        id: DbId,
        image_refs: &[String],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE radar_readings \
             SET correlated_image_refs = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(image_refs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Link a fine and mark the reading processed.
    pub async fn link_fine(
        pool: &PgPool,
        id: DbId,
        fine_id: DbId,
        notes: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE radar_readings \
             SET fine_id = $2, processed = TRUE, processing_notes = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(fine_id)
        .bind(notes)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_processed(pool: &PgPool, id: DbId, notes: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE radar_readings \
             SET processed = TRUE, processing_notes = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(notes)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
