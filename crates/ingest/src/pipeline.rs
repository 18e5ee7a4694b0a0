//! Per-datagram processing.
//!
//! ```text
//! Received -> Parsed -> Duplicate (dropped)
//!                    -> Persisted -> Compliant (done)
//!                                 -> Correlating -> Fined (done)
//! ```
//!
//! Every non-duplicate, well-formed datagram becomes exactly one reading.
//! Violations are correlated with captures, priced and turned into a fine
//! that the store deduplicates on `(radar, second, speed)`.
//!
//! A violation with no capture yet is held until `detected_at` plus the
//! fallback window plus the late-capture grace, then looked up once more
//! before its fine is written. [`Pipeline::release_holds`] ends every hold.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use radarops_core::correlation::{CorrelationResult, Correlator, Detection};
use radarops_core::dedup::{DedupKey, Deduplicator};
use radarops_core::error::{ParseError, PersistenceError};
use radarops_core::fine::{Assessment, FineSchedule, NewFine};
use radarops_core::parser::MessageParser;
use radarops_core::ports::{
    CaptureStore, FineHandle, RadarDefaults, RadarRegistry, ReadingHandle, ReadingStore,
};
use radarops_core::reading::{
    hex_upper, truncate_to_second, NewRadarReading, NormalizedReading, ReadingSummary,
};
use radarops_core::types::Timestamp;
use radarops_events::{EventBus, RadarEvent};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::config::IngestConfig;
use crate::error::PipelineError;
use crate::stats::IngestStats;

/// One UDP payload as received.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
    pub received_at: Timestamp,
}

impl Datagram {
    pub fn new(payload: impl Into<Vec<u8>>, source: SocketAddr, received_at: Timestamp) -> Self {
        Self {
            payload: payload.into(),
            source,
            received_at,
        }
    }
}

/// Terminal state of a datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum DatagramOutcome {
    /// Not a valid reading; audited and dropped.
    Rejected(ParseError),
    /// Same radar, speed and second as a recently processed reading.
    Duplicate(DedupKey),
    /// Stored; speed within the limit.
    Compliant { reading: ReadingHandle },
    /// Stored and fined.
    Violation {
        reading: ReadingHandle,
        fine: FineHandle,
        correlation: CorrelationResult,
    },
}

/// Persistence collaborators used by the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub readings: Arc<dyn ReadingStore>,
    pub captures: Arc<dyn CaptureStore>,
    pub radars: Arc<dyn RadarRegistry>,
}

impl Collaborators {
    /// Use one store for every port.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ReadingStore + CaptureStore + RadarRegistry + 'static,
    {
        Self {
            readings: store.clone(),
            captures: store.clone(),
            radars: store,
        }
    }
}

pub struct Pipeline {
    parser: MessageParser,
    dedup: Arc<Deduplicator>,
    schedule: FineSchedule,
    correlator: Correlator,
    readings: Arc<dyn ReadingStore>,
    radars: Arc<dyn RadarRegistry>,
    radar_defaults: RadarDefaults,
    late_capture_grace: Duration,
    holds_released: CancellationToken,
    bus: Arc<EventBus>,
    stats: Arc<IngestStats>,
}

impl Pipeline {
    pub fn new(config: &IngestConfig, collaborators: Collaborators, bus: Arc<EventBus>) -> Self {
        Self {
            parser: MessageParser::new(config.clock_offset),
            dedup: Arc::new(Deduplicator::new(config.dedup_capacity)),
            schedule: FineSchedule::default(),
            correlator: Correlator::new(collaborators.captures, config.correlation.clone()),
            readings: collaborators.readings,
            radars: collaborators.radars,
            radar_defaults: RadarDefaults {
                speed_limit: config.speed_limit,
            },
            late_capture_grace: config.late_capture_grace,
            holds_released: CancellationToken::new(),
            bus,
            stats: Arc::new(IngestStats::new()),
        }
    }

    /// Replace the default fine table.
    pub fn with_schedule(mut self, schedule: FineSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    pub fn dedup(&self) -> &Arc<Deduplicator> {
        &self.dedup
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Stop waiting for late captures. Held violations are looked up and
    /// fined right away; later violations are not held.
    pub fn release_holds(&self) {
        self.holds_released.cancel();
    }

    /// Drive one datagram to a terminal state.
    ///
    /// Parse failures and duplicates are outcomes, not errors. Persistence
    /// failures are returned after the dedup key has been released so a
    /// retransmission can retry.
    pub async fn handle(&self, datagram: Datagram) -> Result<DatagramOutcome, PipelineError> {
        self.process(datagram, None).await
    }

    /// Like [`handle`](Self::handle), giving `permit` back while the
    /// violation waits for a late capture.
    pub async fn handle_with_permit(
        &self,
        datagram: Datagram,
        permit: OwnedSemaphorePermit,
    ) -> Result<DatagramOutcome, PipelineError> {
        self.process(datagram, Some(permit)).await
    }

    async fn process(
        &self,
        datagram: Datagram,
        mut permit: Option<OwnedSemaphorePermit>,
    ) -> Result<DatagramOutcome, PipelineError> {
        let reading = match self
            .parser
            .parse(&datagram.payload, datagram.source, datagram.received_at)
        {
            Ok(reading) => reading,
            Err(e) => {
                self.reject(&datagram, &e);
                return Ok(DatagramOutcome::Rejected(e));
            }
        };

        let key = DedupKey::from(&reading);
        if !self.dedup.admit(key) {
            self.stats.record_duplicate();
            tracing::debug!(
                radar_id = reading.radar_id,
                speed = reading.speed,
                source = %reading.source,
                "Duplicate reading dropped",
            );
            return Ok(DatagramOutcome::Duplicate(key));
        }

        match self.persist(&reading, &mut permit).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.dedup.forget(&key);
                self.stats.record_error();
                Err(e.into())
            }
        }
    }

    fn reject(&self, datagram: &Datagram, error: &ParseError) {
        self.stats.record_error();
        let raw_hex = hex_upper(&datagram.payload);
        tracing::warn!(
            source = %datagram.source,
            raw = %raw_hex,
            error = %error,
            "Rejected radar datagram",
        );
        self.bus.publish(RadarEvent::datagram_rejected(
            datagram.source,
            &raw_hex,
            &error.to_string(),
        ));
    }

    async fn persist(
        &self,
        reading: &NormalizedReading,
        permit: &mut Option<OwnedSemaphorePermit>,
    ) -> Result<DatagramOutcome, PersistenceError> {
        let radar = self
            .radars
            .ensure_radar_exists(reading.radar_id, &self.radar_defaults)
            .await?;

        let row = NewRadarReading::from_reading(reading, radar.speed_limit);
        let handle = self.readings.save_reading(&row).await?;
        self.stats.record_reading_saved();
        let summary = ReadingSummary::new(handle.0, &row);

        let Some(assessment) = self.schedule.assess(row.speed_detected, row.speed_limit) else {
            tracing::debug!(
                reading_id = handle.0,
                radar_id = row.radar_id,
                speed = row.speed_detected,
                limit = row.speed_limit,
                format = %row.message_format,
                "Compliant reading stored",
            );
            self.bus
                .publish(RadarEvent::reading_processed(&summary, false, None, false));
            return Ok(DatagramOutcome::Compliant { reading: handle });
        };

        self.stats.record_violation();
        match self
            .settle_violation(reading, &row, handle, assessment, permit)
            .await
        {
            Ok((fine, correlation)) => {
                self.bus.publish(RadarEvent::reading_processed(
                    &summary,
                    true,
                    Some(fine.id),
                    fine.created,
                ));
                Ok(DatagramOutcome::Violation {
                    reading: handle,
                    fine,
                    correlation,
                })
            }
            Err(e) => {
                let note = format!("Fine not recorded: {e}");
                if let Err(mark_err) = self.readings.mark_processed(handle, &note).await {
                    tracing::warn!(
                        reading_id = handle.0,
                        error = %mark_err,
                        "Failed to annotate reading after fine failure",
                    );
                }
                tracing::error!(
                    reading_id = handle.0,
                    radar_id = row.radar_id,
                    speed = row.speed_detected,
                    error = %e,
                    "Violation could not be fined",
                );
                Err(e)
            }
        }
    }

    async fn settle_violation(
        &self,
        reading: &NormalizedReading,
        row: &NewRadarReading,
        handle: ReadingHandle,
        assessment: Assessment,
        permit: &mut Option<OwnedSemaphorePermit>,
    ) -> Result<(FineHandle, CorrelationResult), PersistenceError> {
        let detection = Detection {
            radar_id: row.radar_id,
            detected_at: row.detected_at,
        };
        let mut correlation = self.correlator.correlate(&detection).await;

        if correlation.is_empty() {
            if let Some(hold) = self.late_capture_hold(row.detected_at) {
                drop(permit.take());
                tracing::debug!(
                    reading_id = handle.0,
                    radar_id = row.radar_id,
                    hold_ms = u64::try_from(hold.as_millis()).unwrap_or(u64::MAX),
                    "No capture yet, holding violation",
                );
                tokio::select! {
                    () = tokio::time::sleep(hold) => {}
                    () = self.holds_released.cancelled() => {}
                }
                correlation = self.correlator.correlate(&detection).await;
            }
        }

        if correlation.is_empty() {
            self.stats.record_correlation_miss();
        } else {
            self.readings
                .attach_images(handle, &correlation.image_refs)
                .await?;
        }

        let fine = NewFine {
            radar_id: row.radar_id,
            vehicle_plate: correlation.plate.clone(),
            speed_detected: row.speed_detected,
            speed_limit: row.speed_limit,
            violation_amount: assessment.violation_amount,
            fine_amount: assessment.fine_amount,
            violation_at: truncate_to_second(row.detected_at),
            image_ref: correlation.image_ref().map(str::to_string),
            notes: self.fine_notes(reading, row, &assessment, &correlation),
        };
        let saved = self.readings.save_fine(&fine).await?;
        if saved.created {
            self.stats.record_fine_created();
        }

        let note = if saved.created {
            format!("Fine {} created", saved.id)
        } else {
            format!("Linked to existing fine {}", saved.id)
        };
        self.readings
            .link_fine_to_reading(handle, saved.id, &note)
            .await?;

        tracing::info!(
            reading_id = handle.0,
            fine_id = saved.id,
            created = saved.created,
            radar_id = row.radar_id,
            speed = row.speed_detected,
            limit = row.speed_limit,
            amount = %assessment.fine_amount,
            image_ref = fine.image_ref.as_deref().unwrap_or("-"),
            plate = fine.vehicle_plate.as_deref().unwrap_or("-"),
            "Speed violation fined",
        );

        Ok((saved, correlation))
    }

    /// Time left until no capture for `detected_at` can still be expected,
    /// or `None` when that moment has passed or holds are released.
    fn late_capture_hold(&self, detected_at: Timestamp) -> Option<Duration> {
        if self.holds_released.is_cancelled() {
            return None;
        }
        let grace = chrono::Duration::from_std(self.late_capture_grace).ok()?;
        let longest = self.correlator.policy().fallback_window.checked_add(&grace)?;
        let deadline = detected_at.checked_add_signed(longest)?;
        let remaining = (deadline - Utc::now()).min(longest);
        remaining.to_std().ok().filter(|hold| !hold.is_zero())
    }

    fn fine_notes(
        &self,
        reading: &NormalizedReading,
        row: &NewRadarReading,
        assessment: &Assessment,
        correlation: &CorrelationResult,
    ) -> String {
        let mut notes = format!(
            "Speed violation: {} km/h in {} km/h zone. Excess: {} km/h. Source: {}.",
            row.speed_detected, row.speed_limit, assessment.violation_amount, reading.source
        );
        match &correlation.provenance {
            Some(provenance) => {
                notes.push(' ');
                notes.push_str(&provenance.to_string());
                notes.push('.');
                if correlation.plate.is_none() {
                    notes.push_str(" Plate not recognised with sufficient confidence.");
                }
            }
            None => {
                let policy = self.correlator.policy();
                notes.push_str(&format!(
                    " No capture within ±{}s.",
                    policy.fallback_window.max(policy.primary_window).num_seconds()
                ));
            }
        }
        if reading.time_defaulted {
            notes.push_str(" Detection time taken from receive time.");
        }
        notes
    }
}
