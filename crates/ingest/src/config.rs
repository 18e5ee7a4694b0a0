use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use radarops_core::correlation::CorrelationPolicy;
use radarops_core::dedup::DEFAULT_DEDUP_CAPACITY;
use radarops_core::reading::DEFAULT_SPEED_LIMIT;

use crate::error::ConfigError;

/// Port radars send to unless configured otherwise.
pub const DEFAULT_UDP_PORT: u16 = 17081;

/// Widest accepted correlation window.
const MAX_WINDOW_SECS: i64 = 86_400;

/// Ingestion configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub udp_bind_addr: SocketAddr,
    /// Limit given to radars registered on first sight, in km/h.
    pub speed_limit: i32,
    pub queue_capacity: usize,
    /// Maximum datagrams processed concurrently.
    pub workers: usize,
    pub dedup_capacity: usize,
    pub correlation: CorrelationPolicy,
    /// Extra wait past the fallback window for captures indexed late.
    pub late_capture_grace: Duration,
    /// Offset applied to zone-less clock times from radars and cameras.
    pub clock_offset: FixedOffset,
    /// File-drop directory; the capture indexer is off when unset.
    pub capture_dir: Option<PathBuf>,
    pub capture_scan_interval: Duration,
    pub stats_log_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            udp_bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_UDP_PORT)),
            speed_limit: DEFAULT_SPEED_LIMIT,
            queue_capacity: 1024,
            workers: 8,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            correlation: CorrelationPolicy::default(),
            late_capture_grace: Duration::from_secs(10),
            clock_offset: Utc.fix(),
            capture_dir: None,
            capture_scan_interval: Duration::from_secs(5),
            stats_log_interval: Duration::from_secs(60),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default          |
    /// |------------------------------------|------------------|
    /// | `UDP_BIND_ADDR`                    | `0.0.0.0:17081`  |
    /// | `SPEED_LIMIT`                      | `30`             |
    /// | `INGEST_QUEUE_CAPACITY`            | `1024`           |
    /// | `INGEST_WORKERS`                   | `8`              |
    /// | `DEDUP_CAPACITY`                   | `1000`           |
    /// | `CORRELATION_PRIMARY_WINDOW_SECS`  | `2`              |
    /// | `CORRELATION_FALLBACK_WINDOW_SECS` | `10`             |
    /// | `CORRELATION_MIN_CONFIDENCE`       | `70`             |
    /// | `CORRELATION_TIMEOUT_MS`           | `2000`           |
    /// | `CORRELATION_GRACE_SECS`           | `10`             |
    /// | `RADAR_CLOCK_OFFSET_MINUTES`       | `0`              |
    /// | `CAPTURE_DIR`                      | unset            |
    /// | `CAPTURE_SCAN_INTERVAL_SECS`       | `5`              |
    /// | `STATS_LOG_INTERVAL_SECS`          | `60`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let udp_bind_addr = parse_or(&lookup, "UDP_BIND_ADDR", defaults.udp_bind_addr)?;
        let speed_limit: i32 = parse_or(&lookup, "SPEED_LIMIT", defaults.speed_limit)?;
        if speed_limit <= 0 {
            return Err(ConfigError::invalid("SPEED_LIMIT", speed_limit, "must be positive"));
        }

        let queue_capacity: usize =
            parse_or(&lookup, "INGEST_QUEUE_CAPACITY", defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(ConfigError::invalid("INGEST_QUEUE_CAPACITY", 0, "must be at least 1"));
        }
        let workers: usize = parse_or(&lookup, "INGEST_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ConfigError::invalid("INGEST_WORKERS", 0, "must be at least 1"));
        }
        let dedup_capacity: usize = parse_or(&lookup, "DEDUP_CAPACITY", defaults.dedup_capacity)?;
        if dedup_capacity == 0 {
            return Err(ConfigError::invalid("DEDUP_CAPACITY", 0, "must be at least 1"));
        }

        let correlation = correlation_policy(&lookup)?;
        let grace_secs: u64 = parse_or(
            &lookup,
            "CORRELATION_GRACE_SECS",
            defaults.late_capture_grace.as_secs(),
        )?;
        window("CORRELATION_GRACE_SECS", grace_secs)?;
        let late_capture_grace = Duration::from_secs(grace_secs);

        let offset_minutes: i32 = parse_or(&lookup, "RADAR_CLOCK_OFFSET_MINUTES", 0)?;
        let clock_offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::invalid(
                "RADAR_CLOCK_OFFSET_MINUTES",
                offset_minutes,
                "must be within ±1439 minutes",
            )
        })?;

        let capture_dir = lookup("CAPTURE_DIR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let capture_scan_interval = Duration::from_secs(positive_secs(
            &lookup,
            "CAPTURE_SCAN_INTERVAL_SECS",
            defaults.capture_scan_interval.as_secs(),
        )?);
        let stats_log_interval = Duration::from_secs(positive_secs(
            &lookup,
            "STATS_LOG_INTERVAL_SECS",
            defaults.stats_log_interval.as_secs(),
        )?);

        Ok(Self {
            udp_bind_addr,
            speed_limit,
            queue_capacity,
            workers,
            dedup_capacity,
            correlation,
            late_capture_grace,
            clock_offset,
            capture_dir,
            capture_scan_interval,
            stats_log_interval,
        })
    }
}

fn correlation_policy(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<CorrelationPolicy, ConfigError> {
    let defaults = CorrelationPolicy::default();

    let primary = positive_secs(
        lookup,
        "CORRELATION_PRIMARY_WINDOW_SECS",
        defaults.primary_window.num_seconds() as u64,
    )?;
    let fallback = positive_secs(
        lookup,
        "CORRELATION_FALLBACK_WINDOW_SECS",
        defaults.fallback_window.num_seconds() as u64,
    )?;
    if fallback < primary {
        return Err(ConfigError::invalid(
            "CORRELATION_FALLBACK_WINDOW_SECS",
            fallback,
            format!("must not be narrower than the primary window ({primary}s)"),
        ));
    }

    let min_confidence: f32 =
        parse_or(lookup, "CORRELATION_MIN_CONFIDENCE", defaults.min_confidence)?;
    if !(0.0..=100.0).contains(&min_confidence) {
        return Err(ConfigError::invalid(
            "CORRELATION_MIN_CONFIDENCE",
            min_confidence,
            "must be a percentage between 0 and 100",
        ));
    }

    let timeout_ms: u64 = parse_or(
        lookup,
        "CORRELATION_TIMEOUT_MS",
        defaults.lookup_timeout.as_millis() as u64,
    )?;
    if timeout_ms == 0 {
        return Err(ConfigError::invalid("CORRELATION_TIMEOUT_MS", 0, "must be positive"));
    }

    Ok(CorrelationPolicy {
        primary_window: window("CORRELATION_PRIMARY_WINDOW_SECS", primary)?,
        fallback_window: window("CORRELATION_FALLBACK_WINDOW_SECS", fallback)?,
        min_confidence,
        lookup_timeout: Duration::from_millis(timeout_ms),
    })
}

fn window(var: &'static str, secs: u64) -> Result<chrono::Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .filter(|secs| *secs <= MAX_WINDOW_SECS)
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| {
            ConfigError::invalid(var, secs, format!("must be at most {MAX_WINDOW_SECS} seconds"))
        })
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, &raw, e.to_string())),
        _ => Ok(default),
    }
}

fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let secs: u64 = parse_or(lookup, var, default)?;
    if secs == 0 {
        return Err(ConfigError::invalid(var, 0, "must be at least 1 second"));
    }
    Ok(secs)
}
