//! Collaborator ports consumed by the pipeline.
//!
//! The Postgres implementations live in `radarops-db`; tests use in-memory
//! fakes. Every failure is reported as a [`PersistenceError`] and never
//! retried here.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::fine::NewFine;
use crate::reading::{NewRadarReading, DEFAULT_SPEED_LIMIT};
use crate::types::{DbId, RadarId, Timestamp};

// ---------------------------------------------------------------------------
// Handles and inputs
// ---------------------------------------------------------------------------

/// Id of a persisted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReadingHandle(pub DbId);

/// A fine as returned by [`ReadingStore::save_fine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FineHandle {
    pub id: DbId,
    /// `false` when the uniqueness triple already existed and the existing
    /// fine was returned.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadarHandle {
    pub id: RadarId,
    pub speed_limit: i32,
    /// `true` when this call registered the radar.
    pub created: bool,
}

/// Values used when a radar is registered on first sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarDefaults {
    pub speed_limit: i32,
}

impl Default for RadarDefaults {
    fn default() -> Self {
        Self {
            speed_limit: DEFAULT_SPEED_LIMIT,
        }
    }
}

impl RadarDefaults {
    pub fn name_for(radar_id: RadarId) -> String {
        format!("Radar {radar_id}")
    }

    pub fn location_for(radar_id: RadarId) -> String {
        format!("Location {radar_id}")
    }
}

/// A camera capture as seen by the correlator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureCandidate {
    pub image_ref: String,
    /// Radar the capture was filed under, when known.
    pub radar_id: Option<RadarId>,
    pub captured_at: Timestamp,
    pub plate_text: Option<String>,
    /// Plate recognition confidence in percent (0–100).
    pub confidence: Option<f32>,
}

/// A capture discovered by the file-drop indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapture {
    pub image_ref: String,
    pub radar_id: Option<RadarId>,
    pub captured_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Writes readings and fines.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save_reading(
        &self,
        reading: &NewRadarReading,
    ) -> Result<ReadingHandle, PersistenceError>;

    /// Record the image refs correlated with a violation reading.
    async fn attach_images(
        &self,
        reading: ReadingHandle,
        image_refs: &[String],
    ) -> Result<(), PersistenceError>;

    /// Insert a fine, or return the existing one for the same
    /// `(radar_id, violation_at, speed_detected)`.
    async fn save_fine(&self, fine: &NewFine) -> Result<FineHandle, PersistenceError>;

    /// Link the fine and mark the reading processed.
    async fn link_fine_to_reading(
        &self,
        reading: ReadingHandle,
        fine_id: DbId,
        notes: &str,
    ) -> Result<(), PersistenceError>;

    /// Mark the reading processed without a fine.
    async fn mark_processed(
        &self,
        reading: ReadingHandle,
        notes: &str,
    ) -> Result<(), PersistenceError>;
}

/// Read-only search over captures.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    /// Captures with `start <= captured_at <= end`.
    async fn find_candidates_in_window(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<CaptureCandidate>, PersistenceError>;
}

#[async_trait]
pub trait RadarRegistry: Send + Sync {
    /// Return the radar, registering it with `defaults` if unknown.
    async fn ensure_radar_exists(
        &self,
        radar_id: RadarId,
        defaults: &RadarDefaults,
    ) -> Result<RadarHandle, PersistenceError>;
}

/// Writes captures discovered on disk.
#[async_trait]
pub trait CaptureIndex: Send + Sync {
    /// `false` when the image ref was already indexed.
    async fn record_capture(&self, capture: &NewCapture) -> Result<bool, PersistenceError>;
}
