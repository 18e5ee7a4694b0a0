//! Repository for the `radars` table.

use radarops_core::ports::RadarDefaults;
use radarops_core::types::RadarId;
use sqlx::PgPool;

use crate::models::radar::Radar;
use crate::models::status::RadarStatus;

/// Column list for `radars` queries.
const COLUMNS: &str = "id, name, location, status_id, speed_limit, created_at, updated_at";

/// Provides query operations for radars.
pub struct RadarRepo;

impl RadarRepo {
    pub async fn find_by_id(pool: &PgPool, id: RadarId) -> Result<Option<Radar>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM radars WHERE id = $1");
        sqlx::query_as::<_, Radar>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Return the radar, inserting it with default name, location and
    /// limit when it does not exist yet.
    ///
    /// The second element is `true` when this call created the row.
    /// Concurrent callers for the same id all get the same row.
    pub async fn ensure(
        pool: &PgPool,
        id: RadarId,
        defaults: &RadarDefaults,
    ) -> Result<(Radar, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO radars (id, name, location, status_id, speed_limit) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Radar>(&query)
            .bind(id)
            .bind(RadarDefaults::name_for(id))
            .bind(RadarDefaults::location_for(id))
            .bind(RadarStatus::Active.id())
            .bind(defaults.speed_limit)
            .fetch_optional(pool)
            .await?;

        if let Some(radar) = inserted {
            return Ok((radar, true));
        }

        let query = format!("SELECT {COLUMNS} FROM radars WHERE id = $1");
        let existing = sqlx::query_as::<_, Radar>(&query)
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok((existing, false))
    }
}
