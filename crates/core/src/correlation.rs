//! Time-window correlation of violations with camera captures.
//!
//! Captures arrive independently of readings (file drop plus an external
//! plate recogniser). For each violation the correlator searches a narrow
//! primary window around the detection time and, if nothing selectable is
//! found, a wider fallback window. A [`MatchStrategy`] picks at most one
//! capture.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::CorrelationError;
use crate::ports::{CaptureCandidate, CaptureStore};
use crate::types::{RadarId, Timestamp};

pub const DEFAULT_PRIMARY_WINDOW_SECS: i64 = 2;
pub const DEFAULT_FALLBACK_WINDOW_SECS: i64 = 10;
/// Minimum plate confidence, in percent, for a plate to be attached.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 70.0;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Policy and result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPolicy {
    /// Half-width of the primary window.
    pub primary_window: chrono::Duration,
    /// Half-width of the fallback window. Ignored when not wider than the
    /// primary window.
    pub fallback_window: chrono::Duration,
    pub min_confidence: f32,
    /// Upper bound on each store lookup.
    pub lookup_timeout: Duration,
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Self {
            primary_window: chrono::Duration::seconds(DEFAULT_PRIMARY_WINDOW_SECS),
            fallback_window: chrono::Duration::seconds(DEFAULT_FALLBACK_WINDOW_SECS),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

/// What is being correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub radar_id: RadarId,
    pub detected_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchWindow {
    Primary,
    Fallback,
}

impl fmt::Display for MatchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// How a capture was selected; rendered into fine notes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchProvenance {
    pub strategy: &'static str,
    pub window: MatchWindow,
    pub window_secs: i64,
    /// Capture time minus detection time.
    pub delta_ms: i64,
    pub plate_confidence: Option<f32>,
}

impl fmt::Display for MatchProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Matched by {} in {} window (±{}s), delta {} ms",
            self.strategy, self.window, self.window_secs, self.delta_ms
        )?;
        match self.plate_confidence {
            Some(c) => write!(f, ", plate confidence {c:.0}%"),
            None => f.write_str(", no plate confidence"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationResult {
    /// The selected capture's image ref, if any. At most one entry.
    pub image_refs: Vec<String>,
    /// Set only when the capture's confidence met the policy threshold.
    pub plate: Option<String>,
    pub confidence: Option<f32>,
    pub provenance: Option<MatchProvenance>,
}

impl CorrelationResult {
    pub fn is_empty(&self) -> bool {
        self.image_refs.is_empty()
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.image_refs.first().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Picks the best capture for a detection among window candidates.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(
        &self,
        detection: &Detection,
        candidates: &'a [CaptureCandidate],
    ) -> Option<&'a CaptureCandidate>;
}

/// Smallest absolute time difference wins; ties go to the higher plate
/// confidence, then to the lexically smaller image ref.
///
/// Captures filed under a different radar are never selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosestInTime;

impl MatchStrategy for ClosestInTime {
    fn name(&self) -> &'static str {
        "closest-in-time"
    }

    fn select<'a>(
        &self,
        detection: &Detection,
        candidates: &'a [CaptureCandidate],
    ) -> Option<&'a CaptureCandidate> {
        candidates
            .iter()
            .filter(|c| c.radar_id.is_none_or(|id| id == detection.radar_id))
            .min_by(|a, b| {
                let da = abs_delta_ms(detection.detected_at, a.captured_at);
                let db = abs_delta_ms(detection.detected_at, b.captured_at);
                da.cmp(&db)
                    .then_with(|| compare_confidence_desc(a.confidence, b.confidence))
                    .then_with(|| a.image_ref.cmp(&b.image_ref))
            })
    }
}

fn abs_delta_ms(detected_at: Timestamp, captured_at: Timestamp) -> i64 {
    (captured_at - detected_at).num_milliseconds().abs()
}

/// Higher confidence sorts first; missing confidence sorts last.
fn compare_confidence_desc(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// Read-only correlator over a [`CaptureStore`].
#[derive(Clone)]
pub struct Correlator {
    store: Arc<dyn CaptureStore>,
    strategy: Arc<dyn MatchStrategy>,
    policy: CorrelationPolicy,
}

impl Correlator {
    pub fn new(store: Arc<dyn CaptureStore>, policy: CorrelationPolicy) -> Self {
        Self::with_strategy(store, Arc::new(ClosestInTime), policy)
    }

    pub fn with_strategy(
        store: Arc<dyn CaptureStore>,
        strategy: Arc<dyn MatchStrategy>,
        policy: CorrelationPolicy,
    ) -> Self {
        Self {
            store,
            strategy,
            policy,
        }
    }

    pub fn policy(&self) -> &CorrelationPolicy {
        &self.policy
    }

    /// Best match for `detection`, or an empty result.
    ///
    /// Lookup timeouts and store failures are logged and degrade to an
    /// empty result.
    pub async fn correlate(&self, detection: &Detection) -> CorrelationResult {
        match self.try_correlate(detection).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    radar_id = detection.radar_id,
                    detected_at = %detection.detected_at,
                    error = %e,
                    "Capture correlation failed, continuing without image",
                );
                CorrelationResult::default()
            }
        }
    }

    /// Like [`correlate`](Self::correlate) but surfaces lookup failures.
    pub async fn try_correlate(
        &self,
        detection: &Detection,
    ) -> Result<CorrelationResult, CorrelationError> {
        let mut windows = vec![(MatchWindow::Primary, self.policy.primary_window)];
        if self.policy.fallback_window > self.policy.primary_window {
            windows.push((MatchWindow::Fallback, self.policy.fallback_window));
        }

        for (window, half_width) in windows {
            let candidates = self.lookup(detection.detected_at, half_width).await?;
            if let Some(selected) = self.strategy.select(detection, &candidates) {
                tracing::debug!(
                    radar_id = detection.radar_id,
                    image_ref = %selected.image_ref,
                    %window,
                    candidates = candidates.len(),
                    "Capture matched",
                );
                return Ok(self.result_for(detection, selected, window, half_width));
            }
        }

        Ok(CorrelationResult::default())
    }

    async fn lookup(
        &self,
        at: Timestamp,
        half_width: chrono::Duration,
    ) -> Result<Vec<CaptureCandidate>, CorrelationError> {
        let timeout = self.policy.lookup_timeout;
        let search = self
            .store
            .find_candidates_in_window(at - half_width, at + half_width);
        match tokio::time::timeout(timeout, search).await {
            Ok(found) => Ok(found?),
            Err(_) => Err(CorrelationError::Timeout(timeout)),
        }
    }

    fn result_for(
        &self,
        detection: &Detection,
        selected: &CaptureCandidate,
        window: MatchWindow,
        half_width: chrono::Duration,
    ) -> CorrelationResult {
        let plate = selected
            .plate_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .filter(|_| {
                selected
                    .confidence
                    .is_some_and(|c| c >= self.policy.min_confidence)
            })
            .map(str::to_string);

        CorrelationResult {
            image_refs: vec![selected.image_ref.clone()],
            plate,
            confidence: selected.confidence,
            provenance: Some(MatchProvenance {
                strategy: self.strategy.name(),
                window,
                window_secs: half_width.num_seconds(),
                delta_ms: (selected.captured_at - detection.detected_at).num_milliseconds(),
                plate_confidence: selected.confidence,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::PersistenceError;

    struct FixedStore(Vec<CaptureCandidate>);

    #[async_trait]
    impl CaptureStore for FixedStore {
        async fn find_candidates_in_window(
            &self,
            start: Timestamp,
            end: Timestamp,
        ) -> Result<Vec<CaptureCandidate>, PersistenceError> {
            Ok(self
                .0
                .iter()
                .filter(|c| c.captured_at >= start && c.captured_at <= end)
                .cloned()
                .collect())
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CaptureStore for SlowStore {
        async fn find_candidates_in_window(
            &self,
            _start: Timestamp,
            _end: Timestamp,
        ) -> Result<Vec<CaptureCandidate>, PersistenceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CaptureStore for FailingStore {
        async fn find_candidates_in_window(
            &self,
            _start: Timestamp,
            _end: Timestamp,
        ) -> Result<Vec<CaptureCandidate>, PersistenceError> {
            Err(PersistenceError::new("find_candidates_in_window", "connection reset"))
        }
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 9, 30, 14, 8, 45).unwrap()
    }

    fn capture(image: &str, offset_ms: i64, plate: Option<&str>, confidence: Option<f32>) -> CaptureCandidate {
        CaptureCandidate {
            image_ref: image.to_string(),
            radar_id: None,
            captured_at: t0() + chrono::Duration::milliseconds(offset_ms),
            plate_text: plate.map(str::to_string),
            confidence,
        }
    }

    fn detection() -> Detection {
        Detection {
            radar_id: 1,
            detected_at: t0(),
        }
    }

    fn correlator(captures: Vec<CaptureCandidate>) -> Correlator {
        Correlator::new(Arc::new(FixedStore(captures)), CorrelationPolicy::default())
    }

    #[tokio::test]
    async fn closest_capture_in_primary_window_wins() {
        let c = correlator(vec![
            capture("far.jpg", 1_800, Some("AAA111"), Some(95.0)),
            capture("near.jpg", -400, Some("BBB222"), Some(85.0)),
        ]);
        let result = c.correlate(&detection()).await;
        assert_eq!(result.image_ref(), Some("near.jpg"));
        assert_eq!(result.plate.as_deref(), Some("BBB222"));
        let provenance = result.provenance.unwrap();
        assert_eq!(provenance.window, MatchWindow::Primary);
        assert_eq!(provenance.delta_ms, -400);
    }

    #[tokio::test]
    async fn equal_distance_prefers_higher_confidence() {
        let c = correlator(vec![
            capture("low.jpg", 500, Some("LOW1"), Some(71.0)),
            capture("high.jpg", -500, Some("HIGH1"), Some(93.0)),
        ]);
        let result = c.correlate(&detection()).await;
        assert_eq!(result.image_ref(), Some("high.jpg"));
        assert_eq!(result.plate.as_deref(), Some("HIGH1"));
    }

    #[tokio::test]
    async fn fallback_window_used_when_primary_is_empty() {
        let c = correlator(vec![capture("late.jpg", 7_000, Some("CCC333"), Some(90.0))]);
        let result = c.correlate(&detection()).await;
        assert_eq!(result.image_ref(), Some("late.jpg"));
        assert_eq!(result.provenance.unwrap().window, MatchWindow::Fallback);
    }

    #[tokio::test]
    async fn nothing_within_any_window_is_empty() {
        let c = correlator(vec![capture("old.jpg", -60_000, None, None)]);
        let result = c.correlate(&detection()).await;
        assert!(result.is_empty());
        assert_eq!(result, CorrelationResult::default());
    }

    #[tokio::test]
    async fn low_confidence_plate_is_not_attached() {
        let c = correlator(vec![capture("blurry.jpg", 100, Some("DDD444"), Some(69.9))]);
        let result = c.correlate(&detection()).await;
        assert_eq!(result.image_ref(), Some("blurry.jpg"));
        assert_eq!(result.plate, None);
        assert_eq!(result.confidence, Some(69.9));
    }

    #[tokio::test]
    async fn plate_without_confidence_is_not_attached() {
        let c = correlator(vec![capture("a.jpg", 0, Some("EEE555"), None)]);
        assert_eq!(c.correlate(&detection()).await.plate, None);
    }

    #[tokio::test]
    async fn captures_from_other_radars_are_skipped() {
        let mut other = capture("other.jpg", 0, Some("FFF666"), Some(99.0));
        other.radar_id = Some(2);
        let mut own = capture("own.jpg", 1_500, None, None);
        own.radar_id = Some(1);
        let result = correlator(vec![other, own]).correlate(&detection()).await;
        assert_eq!(result.image_ref(), Some("own.jpg"));
    }

    #[tokio::test]
    async fn slow_lookup_times_out_and_degrades() {
        let policy = CorrelationPolicy {
            lookup_timeout: Duration::from_millis(20),
            ..CorrelationPolicy::default()
        };
        let c = Correlator::new(Arc::new(SlowStore), policy);
        let err = c.try_correlate(&detection()).await.unwrap_err();
        assert!(matches!(err, CorrelationError::Timeout(_)));
        assert!(c.correlate(&detection()).await.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_degrades() {
        let c = Correlator::new(Arc::new(FailingStore), CorrelationPolicy::default());
        assert!(matches!(
            c.try_correlate(&detection()).await,
            Err(CorrelationError::Lookup(_))
        ));
        assert!(c.correlate(&detection()).await.is_empty());
    }

    #[test]
    fn provenance_renders_for_notes() {
        let p = MatchProvenance {
            strategy: "closest-in-time",
            window: MatchWindow::Primary,
            window_secs: 2,
            delta_ms: 350,
            plate_confidence: Some(91.4),
        };
        assert_eq!(
            p.to_string(),
            "Matched by closest-in-time in primary window (±2s), delta 350 ms, plate confidence 91%"
        );
    }
}
