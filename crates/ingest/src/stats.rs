//! Ingestion counters.
//!
//! Counters only increase until an explicit [`IngestStats::reset`].
//! Operators read them from the stats endpoint and from the periodic
//! summary logged by [`run_reporter`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use radarops_core::types::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct IngestStats {
    messages_received: AtomicU64,
    readings_saved: AtomicU64,
    violations_detected: AtomicU64,
    fines_created: AtomicU64,
    duplicates_dropped: AtomicU64,
    queue_overflows: AtomicU64,
    correlation_misses: AtomicU64,
    errors: AtomicU64,
    listening: AtomicBool,
    started_at: Timestamp,
    last_reset_at: Mutex<Option<Timestamp>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub readings_saved: u64,
    pub violations_detected: u64,
    pub fines_created: u64,
    pub duplicates_dropped: u64,
    pub queue_overflows: u64,
    pub correlation_misses: u64,
    pub errors: u64,
    pub listening: bool,
    pub started_at: Timestamp,
    pub uptime_secs: i64,
    pub last_reset_at: Option<Timestamp>,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            readings_saved: AtomicU64::new(0),
            violations_detected: AtomicU64::new(0),
            fines_created: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            queue_overflows: AtomicU64::new(0),
            correlation_misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            listening: AtomicBool::new(false),
            started_at: Utc::now(),
            last_reset_at: Mutex::new(None),
        }
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_saved(&self) {
        self.readings_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fine_created(&self) {
        self.fines_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A full queue also counts as an error.
    pub fn record_queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
        self.record_error();
    }

    pub fn record_correlation_miss(&self) {
        self.correlation_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Relaxed);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Utc::now();
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_saved: self.readings_saved.load(Ordering::Relaxed),
            violations_detected: self.violations_detected.load(Ordering::Relaxed),
            fines_created: self.fines_created.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            correlation_misses: self.correlation_misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            listening: self.is_listening(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds().max(0),
            last_reset_at: *self.reset_marker(),
        }
    }

    /// Zero every counter. The listening flag and start time are kept.
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.readings_saved,
            &self.violations_detected,
            &self.fines_created,
            &self.duplicates_dropped,
            &self.queue_overflows,
            &self.correlation_misses,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.reset_marker() = Some(Utc::now());
    }

    fn reset_marker(&self) -> std::sync::MutexGuard<'_, Option<Timestamp>> {
        self.last_reset_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Log a stats summary every `interval` until `cancel` fires.
pub async fn run_reporter(
    stats: std::sync::Arc<IngestStats>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Stats reporter stopping");
                break;
            }
            _ = ticker.tick() => {
                let s = stats.snapshot();
                tracing::info!(
                    messages_received = s.messages_received,
                    readings_saved = s.readings_saved,
                    violations_detected = s.violations_detected,
                    fines_created = s.fines_created,
                    duplicates_dropped = s.duplicates_dropped,
                    queue_overflows = s.queue_overflows,
                    errors = s.errors,
                    listening = s.listening,
                    uptime_secs = s.uptime_secs,
                    "Ingestion stats",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = IngestStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_reading_saved();
        stats.record_violation();
        stats.record_fine_created();
        stats.record_duplicate();
        stats.record_correlation_miss();

        let s = stats.snapshot();
        assert_eq!(s.messages_received, 2);
        assert_eq!(s.readings_saved, 1);
        assert_eq!(s.violations_detected, 1);
        assert_eq!(s.fines_created, 1);
        assert_eq!(s.duplicates_dropped, 1);
        assert_eq!(s.correlation_misses, 1);
        assert_eq!(s.errors, 0);
    }

    #[test]
    fn overflow_is_also_an_error() {
        let stats = IngestStats::new();
        stats.record_queue_overflow();
        let s = stats.snapshot();
        assert_eq!(s.queue_overflows, 1);
        assert_eq!(s.errors, 1);
    }

    #[test]
    fn reset_zeroes_counters_but_keeps_state() {
        let stats = IngestStats::new();
        stats.set_listening(true);
        stats.record_received();
        stats.record_error();
        let started = stats.snapshot().started_at;

        stats.reset();

        let s = stats.snapshot();
        assert_eq!(s.messages_received, 0);
        assert_eq!(s.errors, 0);
        assert!(s.listening);
        assert_eq!(s.started_at, started);
        assert!(s.last_reset_at.is_some());
    }

    #[tokio::test]
    async fn reporter_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_reporter(
            std::sync::Arc::new(IngestStats::new()),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}
