//! File-drop capture indexer.
//!
//! Cameras upload images into a directory tree (typically via FTP). The
//! indexer scans the tree on a fixed cadence and records every new image as
//! a capture so the correlator can find it by time.
//!
//! Capture time comes from a `YYYYMMDDHHMMSS` run in the file name
//! (optionally followed by three millisecond digits), read in the camera
//! clock offset; without one the file modification time is used. A path
//! segment named `radar<N>` or `camera<N>` files the capture under radar N.
//!
//! Files modified more than the retention period before the newest file
//! seen so far are skipped, and forgotten once recorded. A subdirectory or
//! file that cannot be read is logged and skipped; only an unreadable root
//! fails the scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use radarops_core::ports::{CaptureIndex, NewCapture};
use radarops_core::types::{RadarId, Timestamp};
use regex::Regex;
use tokio_util::sync::CancellationToken;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// How far behind the newest modification time a file is still indexed.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

static FILENAME_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(\d{14})(\d{3})?(?:[^0-9]|$)").expect("valid regex")
});

static RADAR_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:radar|camera)[_-]?(\d+)").expect("valid regex"));

pub struct CaptureIndexer {
    root: PathBuf,
    index: Arc<dyn CaptureIndex>,
    clock_offset: FixedOffset,
    retention: Duration,
    /// Newest modification time seen, never ahead of the wall clock.
    watermark: Option<SystemTime>,
    /// Recorded paths and their modification times, back to the cutoff.
    seen: HashMap<PathBuf, SystemTime>,
}

/// Running totals of one scan.
#[derive(Default)]
struct ScanPass {
    recorded: usize,
    newest: Option<SystemTime>,
}

impl CaptureIndexer {
    pub fn new(root: PathBuf, index: Arc<dyn CaptureIndex>, clock_offset: FixedOffset) -> Self {
        Self {
            root,
            index,
            clock_offset,
            retention: DEFAULT_RETENTION,
            watermark: None,
            seen: HashMap::new(),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Scan every `interval` until `cancel` fires.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            root = %self.root.display(),
            interval_secs = interval.as_secs(),
            "Capture indexer started",
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Capture indexer stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(0) => tracing::trace!("Capture scan found nothing new"),
                        Ok(recorded) => tracing::info!(recorded, "Indexed new captures"),
                        Err(e) => tracing::error!(
                            root = %self.root.display(),
                            error = %e,
                            "Capture scan failed",
                        ),
                    }
                }
            }
        }
    }

    /// Walk the tree once. Returns how many captures were newly recorded.
    ///
    /// Images whose recording fails are retried on the next scan.
    pub async fn scan_once(&mut self) -> std::io::Result<usize> {
        tokio::fs::read_dir(&self.root).await?;

        let cutoff = self.cutoff();
        let pass = self.scan_tree(vec![self.root.clone()], cutoff).await;

        if let Some(newest) = pass.newest {
            let newest = newest.min(SystemTime::now());
            if self.watermark.is_none_or(|current| newest > current) {
                self.watermark = Some(newest);
            }
        }
        if let Some(cutoff) = self.cutoff() {
            self.seen.retain(|_, modified| *modified >= cutoff);
        }

        Ok(pass.recorded)
    }

    fn cutoff(&self) -> Option<SystemTime> {
        self.watermark
            .and_then(|watermark| watermark.checked_sub(self.retention))
    }

    async fn scan_tree(&mut self, mut pending: Vec<PathBuf>, cutoff: Option<SystemTime>) -> ScanPass {
        let mut pass = ScanPass::default();

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable capture directory");
                    continue;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "Capture directory listing failed");
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping capture entry");
                        continue;
                    }
                };
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !is_image(&path) || self.seen.contains_key(&path) {
                    continue;
                }

                // Follows symlinks; a file removed since listing fails here.
                let modified = match tokio::fs::metadata(&path).await {
                    Ok(metadata) if !metadata.is_file() => continue,
                    Ok(metadata) => metadata.modified(),
                    Err(e) => Err(e),
                };
                let modified = match modified {
                    Ok(modified) => modified,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Unreadable capture file");
                        continue;
                    }
                };
                if cutoff.is_some_and(|cutoff| modified < cutoff) {
                    continue;
                }
                pass.newest = pass.newest.max(Some(modified));

                let capture = self.describe(&path, modified);
                match self.index.record_capture(&capture).await {
                    Ok(inserted) => {
                        if inserted {
                            pass.recorded += 1;
                            tracing::debug!(
                                image_ref = %capture.image_ref,
                                captured_at = %capture.captured_at,
                                radar_id = ?capture.radar_id,
                                "Capture recorded",
                            );
                        }
                        self.seen.insert(path, modified);
                    }
                    Err(e) => {
                        tracing::warn!(image_ref = %capture.image_ref, error = %e, "Failed to record capture");
                    }
                }
            }
        }

        pass
    }

    fn describe(&self, path: &Path, modified: SystemTime) -> NewCapture {
        let image_ref = image_ref(&self.root, path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let captured_at = time_from_file_name(&file_name, self.clock_offset)
            .unwrap_or_else(|| DateTime::<Utc>::from(modified));

        NewCapture {
            radar_id: radar_from_path(&image_ref),
            image_ref,
            captured_at,
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Path relative to the root, with `/` separators.
fn image_ref(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Capture time encoded in a file name, e.g. `cam1_20250930140845123.jpg`.
pub fn time_from_file_name(file_name: &str, clock_offset: FixedOffset) -> Option<Timestamp> {
    let caps = FILENAME_TIME_RE.captures(file_name)?;
    let naive = NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S").ok()?;
    let millis: i64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let local = clock_offset.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc) + chrono::Duration::milliseconds(millis))
}

/// Radar id from the first `radar<N>` / `camera<N>` segment of an image ref.
pub fn radar_from_path(image_ref: &str) -> Option<RadarId> {
    image_ref.split('/').find_map(|segment| {
        RADAR_SEGMENT_RE
            .captures(segment)
            .and_then(|caps| caps[1].parse().ok())
    })
}
