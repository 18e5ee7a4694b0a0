//! Radar reading records as they move through the pipeline.
//!
//! [`NormalizedReading`] is what the parser produces from a datagram;
//! [`NewRadarReading`] is the row handed to the persistence collaborator.

use std::fmt;
use std::net::SocketAddr;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, RadarId, Timestamp};

/// Speed limit applied when neither configuration nor the radar supplies one.
pub const DEFAULT_SPEED_LIMIT: i32 = 30;

/// Wire format a reading arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Text,
    Json,
    Binary,
    Unknown,
}

impl MessageFormat {
    /// Database / log representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the database representation; anything unknown maps to `Unknown`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "json" => Self::Json,
            "binary" => Self::Binary,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub radar_id: RadarId,
    /// Detected speed in km/h.
    pub speed: i32,
    /// Resolved absolute detection time (UTC).
    pub detected_at: Timestamp,
    pub format: MessageFormat,
    /// Original datagram bytes, echoed for traceability.
    pub raw: Vec<u8>,
    pub source: SocketAddr,
    /// `true` when the payload carried no time and the receive time was used.
    pub time_defaulted: bool,
}

impl NormalizedReading {
    /// Raw payload rendered for storage: uppercase hex for binary frames,
    /// trimmed text otherwise. Padding NULs are dropped; text that still
    /// carries control bytes or invalid UTF-8 is stored as hex.
    pub fn raw_payload(&self) -> String {
        if self.format == MessageFormat::Binary {
            return hex_upper(&self.raw);
        }
        let end = self
            .raw
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        let bytes = &self.raw[..end];
        match std::str::from_utf8(bytes) {
            Ok(text) if is_printable(text.trim()) => text.trim().to_string(),
            _ => hex_upper(bytes),
        }
    }

    /// Detection time truncated to whole seconds.
    pub fn detected_second(&self) -> Timestamp {
        truncate_to_second(self.detected_at)
    }

    pub fn is_violation(&self, speed_limit: i32) -> bool {
        self.speed > speed_limit
    }
}

/// Drop the sub-second part of a timestamp.
pub fn truncate_to_second(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}

fn is_printable(text: &str) -> bool {
    !text.chars().any(char::is_control)
}

/// Render bytes as contiguous uppercase hex (`FEAF0501...`).
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// A reading ready to be persisted.
///
/// `is_violation` is derived once from speed and limit here so the stored
/// flag always agrees with the stored numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRadarReading {
    pub radar_id: RadarId,
    pub speed_detected: i32,
    pub speed_limit: i32,
    pub detected_at: Timestamp,
    pub is_violation: bool,
    pub source_address: String,
    pub raw_payload: String,
    pub message_format: MessageFormat,
    /// Compliant readings need no further work and are stored processed.
    pub processed: bool,
}

impl NewRadarReading {
    pub fn from_reading(reading: &NormalizedReading, speed_limit: i32) -> Self {
        let is_violation = reading.is_violation(speed_limit);
        Self {
            radar_id: reading.radar_id,
            speed_detected: reading.speed,
            speed_limit,
            detected_at: reading.detected_at,
            is_violation,
            source_address: reading.source.to_string(),
            raw_payload: reading.raw_payload(),
            message_format: reading.format,
            processed: !is_violation,
        }
    }
}

/// Compact description of a persisted reading, pushed to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub reading_id: DbId,
    pub radar_id: RadarId,
    pub speed_detected: i32,
    pub speed_limit: i32,
    pub detected_at: Timestamp,
    pub format: MessageFormat,
}

impl ReadingSummary {
    pub fn new(reading_id: DbId, reading: &NewRadarReading) -> Self {
        Self {
            reading_id,
            radar_id: reading.radar_id,
            speed_detected: reading.speed_detected,
            speed_limit: reading.speed_limit,
            detected_at: reading.detected_at,
            format: reading.message_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn reading(format: MessageFormat, raw: &[u8], speed: i32) -> NormalizedReading {
        NormalizedReading {
            radar_id: 4,
            speed,
            detected_at: chrono::Utc
                .with_ymd_and_hms(2025, 9, 30, 14, 8, 45)
                .unwrap()
                .with_nanosecond(750_000_000)
                .unwrap(),
            format,
            raw: raw.to_vec(),
            source: "10.0.0.7:5000".parse().unwrap(),
            time_defaulted: false,
        }
    }

    #[test]
    fn binary_payload_is_rendered_as_hex() {
        let r = reading(
            MessageFormat::Binary,
            &[0xFE, 0xAF, 0x05, 0x01, 0x0A, 0x46, 0x16, 0xEF],
            70,
        );
        assert_eq!(r.raw_payload(), "FEAF05010A4616EF");
    }

    #[test]
    fn text_payload_is_trimmed() {
        let r = reading(MessageFormat::Text, b"  ID: 1,Speed: 55, Time: 14:08:45.\r\n", 55);
        assert_eq!(r.raw_payload(), "ID: 1,Speed: 55, Time: 14:08:45.");
    }

    #[test]
    fn trailing_nuls_are_stripped_from_text() {
        let r = reading(MessageFormat::Text, b"ID: 4,Speed: 95, Time: 14:08:46.\0\0\0", 95);
        assert_eq!(r.raw_payload(), "ID: 4,Speed: 95, Time: 14:08:46.");
    }

    #[test]
    fn text_with_embedded_control_bytes_is_rendered_as_hex() {
        let r = reading(MessageFormat::Text, b"ID: 4\0,Speed: 95", 95);
        let payload = r.raw_payload();
        assert_eq!(payload, hex_upper(b"ID: 4\0,Speed: 95"));
        assert!(!payload.contains('\0'));

        let r = reading(MessageFormat::Json, &[0x7B, 0xFF, 0x7D], 95);
        assert_eq!(r.raw_payload(), "7BFF7D");
    }

    #[test]
    fn violation_flag_follows_speed_and_limit() {
        let at_limit = NewRadarReading::from_reading(&reading(MessageFormat::Json, b"{}", 30), 30);
        assert!(!at_limit.is_violation);
        assert!(at_limit.processed);

        let over = NewRadarReading::from_reading(&reading(MessageFormat::Json, b"{}", 31), 30);
        assert!(over.is_violation);
        assert!(!over.processed);
        assert_eq!(over.source_address, "10.0.0.7:5000");
    }

    #[test]
    fn detected_second_drops_fraction() {
        let r = reading(MessageFormat::Text, b"", 10);
        assert_eq!(r.detected_second().nanosecond(), 0);
        assert_eq!(r.detected_second().second(), 45);
    }

    #[test]
    fn format_db_representation_is_stable() {
        for format in [
            MessageFormat::Text,
            MessageFormat::Json,
            MessageFormat::Binary,
            MessageFormat::Unknown,
        ] {
            assert_eq!(MessageFormat::from_db(format.as_str()), format);
        }
        assert_eq!(MessageFormat::from_db("csv"), MessageFormat::Unknown);
    }
}
