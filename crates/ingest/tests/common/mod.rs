//! In-memory implementations of the pipeline ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use radarops_core::error::PersistenceError;
use radarops_core::fine::NewFine;
use radarops_core::ports::{
    CaptureCandidate, CaptureStore, FineHandle, RadarDefaults, RadarHandle, RadarRegistry,
    ReadingHandle, ReadingStore,
};
use radarops_core::reading::NewRadarReading;
use radarops_core::types::{DbId, RadarId, Timestamp};
use radarops_events::EventBus;
use radarops_ingest::{Collaborators, IngestConfig, Pipeline};
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Stored rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: DbId,
    pub row: NewRadarReading,
    pub image_refs: Option<Vec<String>>,
    pub fine_id: Option<DbId>,
    pub processed: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredFine {
    pub id: DbId,
    pub fine: NewFine,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    next_id: AtomicI64,
    pub readings: Mutex<Vec<StoredReading>>,
    pub fines: Mutex<Vec<StoredFine>>,
    pub radars: Mutex<HashMap<RadarId, RadarHandle>>,
    pub captures: Mutex<Vec<CaptureCandidate>>,
    pub fail_save_fine: AtomicBool,
    pub fail_save_reading: AtomicBool,
    /// `save_reading` waits for a permit; starts open.
    pub gate: Semaphore,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            readings: Mutex::new(Vec::new()),
            fines: Mutex::new(Vec::new()),
            radars: Mutex::new(HashMap::new()),
            captures: Mutex::new(Vec::new()),
            fail_save_fine: AtomicBool::new(false),
            fail_save_reading: AtomicBool::new(false),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }
}

impl MemoryStore {
    /// A store whose `save_reading` blocks until [`open_gate`](Self::open_gate).
    pub fn gated() -> Self {
        Self {
            gate: Semaphore::new(0),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(1_000);
    }

    pub fn add_capture(&self, capture: CaptureCandidate) {
        self.captures.lock().unwrap().push(capture);
    }

    pub fn readings(&self) -> Vec<StoredReading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn fines(&self) -> Vec<StoredFine> {
        self.fines.lock().unwrap().clone()
    }

    fn next_id(&self) -> DbId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn update_reading(
        &self,
        operation: &'static str,
        id: DbId,
        f: impl FnOnce(&mut StoredReading),
    ) -> Result<(), PersistenceError> {
        let mut readings = self.readings.lock().unwrap();
        let reading = readings
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PersistenceError::new(operation, "reading not found"))?;
        f(reading);
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn save_reading(
        &self,
        reading: &NewRadarReading,
    ) -> Result<ReadingHandle, PersistenceError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| PersistenceError::new("save_reading", e))?;
        if self.fail_save_reading.load(Ordering::SeqCst) {
            return Err(PersistenceError::new("save_reading", "database unavailable"));
        }
        let id = self.next_id();
        self.readings.lock().unwrap().push(StoredReading {
            id,
            row: reading.clone(),
            image_refs: None,
            fine_id: None,
            processed: reading.processed,
            notes: None,
        });
        Ok(ReadingHandle(id))
    }

    async fn attach_images(
        &self,
        reading: ReadingHandle,
        image_refs: &[String],
    ) -> Result<(), PersistenceError> {
        self.update_reading("attach_images", reading.0, |r| {
            r.image_refs = Some(image_refs.to_vec());
        })
    }

    async fn save_fine(&self, fine: &NewFine) -> Result<FineHandle, PersistenceError> {
        if self.fail_save_fine.load(Ordering::SeqCst) {
            return Err(PersistenceError::new("save_fine", "database unavailable"));
        }
        let mut fines = self.fines.lock().unwrap();
        if let Some(existing) = fines.iter().find(|f| {
            f.fine.radar_id == fine.radar_id
                && f.fine.violation_at == fine.violation_at
                && f.fine.speed_detected == fine.speed_detected
        }) {
            return Ok(FineHandle {
                id: existing.id,
                created: false,
            });
        }
        let id = self.next_id();
        fines.push(StoredFine {
            id,
            fine: fine.clone(),
        });
        Ok(FineHandle { id, created: true })
    }

    async fn link_fine_to_reading(
        &self,
        reading: ReadingHandle,
        fine_id: DbId,
        notes: &str,
    ) -> Result<(), PersistenceError> {
        self.update_reading("link_fine_to_reading", reading.0, |r| {
            r.fine_id = Some(fine_id);
            r.processed = true;
            r.notes = Some(notes.to_string());
        })
    }

    async fn mark_processed(
        &self,
        reading: ReadingHandle,
        notes: &str,
    ) -> Result<(), PersistenceError> {
        self.update_reading("mark_processed", reading.0, |r| {
            r.processed = true;
            r.notes = Some(notes.to_string());
        })
    }
}

#[async_trait]
impl CaptureStore for MemoryStore {
    async fn find_candidates_in_window(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<CaptureCandidate>, PersistenceError> {
        Ok(self
            .captures
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.captured_at >= start && c.captured_at <= end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RadarRegistry for MemoryStore {
    async fn ensure_radar_exists(
        &self,
        radar_id: RadarId,
        defaults: &RadarDefaults,
    ) -> Result<RadarHandle, PersistenceError> {
        let mut radars = self.radars.lock().unwrap();
        if let Some(existing) = radars.get(&radar_id) {
            return Ok(RadarHandle {
                created: false,
                ..*existing
            });
        }
        let handle = RadarHandle {
            id: radar_id,
            speed_limit: defaults.speed_limit,
            created: true,
        };
        radars.insert(radar_id, handle);
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn pipeline_with(store: &Arc<MemoryStore>, config: &IngestConfig) -> (Arc<Pipeline>, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let pipeline = Pipeline::new(
        config,
        Collaborators::from_store(Arc::clone(store)),
        Arc::clone(&bus),
    );
    (Arc::new(pipeline), bus)
}

pub fn pipeline(store: &Arc<MemoryStore>) -> (Arc<Pipeline>, Arc<EventBus>) {
    pipeline_with(store, &IngestConfig::default())
}

pub fn radar_source() -> SocketAddr {
    "192.168.1.54:40000".parse().unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 30, 14, 8, 45).unwrap()
}

pub fn capture(
    image_ref: &str,
    offset_ms: i64,
    plate: Option<&str>,
    confidence: Option<f32>,
) -> CaptureCandidate {
    CaptureCandidate {
        image_ref: image_ref.to_string(),
        radar_id: None,
        captured_at: t0() + chrono::Duration::milliseconds(offset_ms),
        plate_text: plate.map(str::to_string),
        confidence,
    }
}
