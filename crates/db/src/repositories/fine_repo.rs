//! Repository for the `fines` table.

use radarops_core::fine::NewFine;
use radarops_core::types::{DbId, RadarId, Timestamp};
use sqlx::PgPool;

use crate::models::fine::Fine;
use crate::models::status::FineStatus;

/// Column list for `fines` queries.
const COLUMNS: &str = "\
    id, radar_id, vehicle_plate, speed_detected, speed_limit, violation_amount, \
    fine_amount, violation_at, status_id, image_ref, notes, created_at, updated_at";

/// Provides query operations for fines.
pub struct FineRepo;

impl FineRepo {
    /// Insert a pending fine, or return the existing fine with the same
    /// `(radar_id, violation_at, speed_detected)`.
    ///
    /// The second element is `true` when this call inserted the row.
    pub async fn create_or_get(pool: &PgPool, fine: &NewFine) -> Result<(Fine, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO fines \
                (radar_id, vehicle_plate, speed_detected, speed_limit, violation_amount, \
                 fine_amount, violation_at, status_id, image_ref, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT ON CONSTRAINT uq_fines_violation DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Fine>(&query)
            .bind(fine.radar_id)
            .bind(&fine.vehicle_plate)
            .bind(fine.speed_detected)
            .bind(fine.speed_limit)
            .bind(fine.violation_amount)
            .bind(fine.fine_amount)
            .bind(fine.violation_at)
            .bind(FineStatus::Pending.id())
            .bind(&fine.image_ref)
            .bind(&fine.notes)
            .fetch_optional(pool)
            .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = Self::find_by_violation(
            pool,
            fine.radar_id,
            fine.violation_at,
            fine.speed_detected,
        )
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
        Ok((existing, false))
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Fine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM fines WHERE id = $1");
        sqlx::query_as::<_, Fine>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_violation(
        pool: &PgPool,
        radar_id: RadarId,
        violation_at: Timestamp,
        speed_detected: i32,
    ) -> Result<Option<Fine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM fines \
             WHERE radar_id = $1 AND violation_at = $2 AND speed_detected = $3"
        );
        sqlx::query_as::<_, Fine>(&query)
            .bind(radar_id)
            .bind(violation_at)
            .bind(speed_detected)
            .fetch_optional(pool)
            .await
    }

    pub async fn count_for_radar(pool: &PgPool, radar_id: RadarId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fines WHERE radar_id = $1")
            .bind(radar_id)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
