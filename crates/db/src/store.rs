//! Postgres implementation of the pipeline's collaborator ports.

use async_trait::async_trait;
use radarops_core::error::PersistenceError;
use radarops_core::fine::NewFine;
use radarops_core::ports::{
    CaptureCandidate, CaptureIndex, CaptureStore, FineHandle, NewCapture, RadarDefaults,
    RadarHandle, RadarRegistry, ReadingHandle, ReadingStore,
};
use radarops_core::reading::NewRadarReading;
use radarops_core::types::{DbId, RadarId, Timestamp};

use crate::repositories::{CaptureRepo, FineRepo, RadarRepo, ReadingRepo};
use crate::DbPool;

/// Implements every port over one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn persistence(operation: &'static str) -> impl FnOnce(sqlx::Error) -> PersistenceError {
    move |e| PersistenceError::new(operation, e)
}

/// An UPDATE that touched no row means the reading id is unknown.
fn require_row(operation: &'static str, updated: bool) -> Result<(), PersistenceError> {
    if updated {
        Ok(())
    } else {
        Err(PersistenceError::new(operation, sqlx::Error::RowNotFound))
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn save_reading(
        &self,
        reading: &NewRadarReading,
    ) -> Result<ReadingHandle, PersistenceError> {
        let row = ReadingRepo::create(&self.pool, reading)
            .await
            .map_err(persistence("save_reading"))?;
        Ok(ReadingHandle(row.id))
    }

    async fn attach_images(
        &self,
        reading: ReadingHandle,
        image_refs: &[String],
    ) -> Result<(), PersistenceError> {
        let updated = ReadingRepo::attach_images(&self.pool, reading.0, image_refs)
            .await
            .map_err(persistence("attach_images"))?;
        require_row("attach_images", updated)
    }

    async fn save_fine(&self, fine: &NewFine) -> Result<FineHandle, PersistenceError> {
        let (row, created) = FineRepo::create_or_get(&self.pool, fine)
            .await
            .map_err(persistence("save_fine"))?;
        Ok(FineHandle {
            id: row.id,
            created,
        })
    }

    async fn link_fine_to_reading(
        &self,
        reading: ReadingHandle,
        fine_id: DbId,
        notes: &str,
    ) -> Result<(), PersistenceError> {
        let updated = ReadingRepo::link_fine(&self.pool, reading.0, fine_id, notes)
            .await
            .map_err(persistence("link_fine_to_reading"))?;
        require_row("link_fine_to_reading", updated)
    }

    async fn mark_processed(
        &self,
        reading: ReadingHandle,
        notes: &str,
    ) -> Result<(), PersistenceError> {
        let updated = ReadingRepo::mark_processed(&self.pool, reading.0, notes)
            .await
            .map_err(persistence("mark_processed"))?;
        require_row("mark_processed", updated)
    }
}

#[async_trait]
impl CaptureStore for PgStore {
    async fn find_candidates_in_window(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<CaptureCandidate>, PersistenceError> {
        let rows = CaptureRepo::find_in_window(&self.pool, start, end)
            .await
            .map_err(persistence("find_candidates_in_window"))?;
        Ok(rows.into_iter().map(CaptureCandidate::from).collect())
    }
}

#[async_trait]
impl RadarRegistry for PgStore {
    async fn ensure_radar_exists(
        &self,
        radar_id: RadarId,
        defaults: &RadarDefaults,
    ) -> Result<RadarHandle, PersistenceError> {
        let (radar, created) = RadarRepo::ensure(&self.pool, radar_id, defaults)
            .await
            .map_err(persistence("ensure_radar_exists"))?;
        if created {
            tracing::info!(radar_id, name = %radar.name, "Registered new radar");
        }
        Ok(RadarHandle {
            id: radar.id,
            speed_limit: radar.speed_limit,
            created,
        })
    }
}

#[async_trait]
impl CaptureIndex for PgStore {
    async fn record_capture(&self, capture: &NewCapture) -> Result<bool, PersistenceError> {
        CaptureRepo::insert_if_new(&self.pool, capture)
            .await
            .map_err(persistence("record_capture"))
    }
}
