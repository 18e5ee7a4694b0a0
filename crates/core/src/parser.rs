//! Radar datagram decoding.
//!
//! Three wire formats are accepted and tried in this order; the first one
//! that matches structurally wins:
//!
//! 1. Binary frame: `FE AF xx xx <radar> <speed> xx EF`.
//! 2. JSON object: `{"radarId": 1, "speed": 55, "timestamp": "..."}` with
//!    the key aliases `radar_id`/`id` and `speedDetected`.
//! 3. Text template: `ID: 1,Speed: 55, Time: 14:08:45.`
//!
//! Text-format clock times carry no date or zone. They are placed on the
//! previous, current or next calendar day in the radar's clock offset,
//! whichever lands closest to the receive time.

use std::net::SocketAddr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::reading::{MessageFormat, NormalizedReading};
use crate::types::{RadarId, Timestamp};

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// Binary frame length in bytes.
pub const FRAME_LEN: usize = 8;
pub const FRAME_START: u8 = 0xFE;
pub const FRAME_MARKER: u8 = 0xAF;
pub const FRAME_END: u8 = 0xEF;
pub const FRAME_RADAR_ID_OFFSET: usize = 4;
pub const FRAME_SPEED_OFFSET: usize = 5;

/// Radar id 0 on the wire means "unassigned" and is attributed to radar 1.
const FALLBACK_RADAR_ID: RadarId = 1;

/// Epoch values below this are seconds, at or above it milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

const RADAR_ID_KEYS: &[&str] = &["radarId", "radar_id", "id"];
const SPEED_KEYS: &[&str] = &["speed", "speedDetected"];
const TIMESTAMP_KEY: &str = "timestamp";

static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ID:\s*(\d+)\s*,\s*Speed:\s*(\d+)\s*,\s*Time:\s*(\d{2}):(\d{2}):(\d{2})")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Stateless datagram decoder.
#[derive(Debug, Clone, Copy)]
pub struct MessageParser {
    clock_offset: FixedOffset,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl MessageParser {
    /// Create a parser that interprets zone-less clock times in `clock_offset`.
    pub fn new(clock_offset: FixedOffset) -> Self {
        Self { clock_offset }
    }

    /// Decode one datagram.
    ///
    /// `received_at` is the coordinator's wall clock and fills in the
    /// detection time when the payload has none.
    pub fn parse(
        &self,
        raw: &[u8],
        source: SocketAddr,
        received_at: Timestamp,
    ) -> Result<NormalizedReading, ParseError> {
        let build = |radar_id, speed, detected_at: Option<Timestamp>, format| NormalizedReading {
            radar_id,
            speed,
            detected_at: detected_at.unwrap_or(received_at),
            format,
            raw: raw.to_vec(),
            source,
            time_defaulted: detected_at.is_none(),
        };

        if let Some((radar_id, speed)) = decode_binary(raw) {
            return Ok(build(radar_id, speed, None, MessageFormat::Binary));
        }

        let text = String::from_utf8_lossy(raw);
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            let (radar_id, speed, detected_at) = self.decode_json(&map)?;
            return Ok(build(radar_id, speed, detected_at, MessageFormat::Json));
        }

        if let Some((radar_id, speed, detected_at)) = self.decode_text(text, received_at)? {
            return Ok(build(radar_id, speed, Some(detected_at), MessageFormat::Text));
        }

        Err(ParseError::UnrecognizedFormat)
    }

    fn decode_json(
        &self,
        map: &Map<String, Value>,
    ) -> Result<(RadarId, i32, Option<Timestamp>), ParseError> {
        let radar_id = match first_present(map, RADAR_ID_KEYS) {
            Some(value) => non_zero_radar(json_int("radarId", value)?),
            None => FALLBACK_RADAR_ID,
        };

        let speed = first_present(map, SPEED_KEYS)
            .ok_or_else(|| ParseError::invalid("speed", "missing"))
            .and_then(|value| json_int("speed", value))?;

        let detected_at = match map.get(TIMESTAMP_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.json_timestamp(value)?),
        };

        Ok((radar_id, speed, detected_at))
    }

    fn json_timestamp(&self, value: &Value) -> Result<Timestamp, ParseError> {
        match value {
            Value::String(s) => self.parse_timestamp_str(s.trim()),
            Value::Number(n) => {
                let epoch = n
                    .as_i64()
                    .ok_or_else(|| ParseError::invalid("timestamp", "not an integer epoch"))?;
                epoch_to_timestamp(epoch)
            }
            _ => Err(ParseError::invalid("timestamp", "unsupported type")),
        }
    }

    fn parse_timestamp_str(&self, s: &str) -> Result<Timestamp, ParseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
                return self.resolve_local(naive);
            }
        }
        if let Ok(epoch) = s.parse::<i64>() {
            return epoch_to_timestamp(epoch);
        }
        Err(ParseError::invalid(
            "timestamp",
            format!("unrecognized timestamp '{s}'"),
        ))
    }

    /// Match the text template. Returns `Ok(None)` when the template does
    /// not match at all so the caller can report an unrecognized format.
    fn decode_text(
        &self,
        text: &str,
        received_at: Timestamp,
    ) -> Result<Option<(RadarId, i32, Timestamp)>, ParseError> {
        let Some(caps) = TEXT_RE.captures(text) else {
            return Ok(None);
        };

        let radar_id = non_zero_radar(decimal_field("radarId", &caps[1])?);
        let speed = decimal_field("speed", &caps[2])?;

        let hms: Vec<u32> = [&caps[3], &caps[4], &caps[5]]
            .iter()
            .map(|part| part.parse::<u32>().unwrap_or(u32::MAX))
            .collect();
        let time = NaiveTime::from_hms_opt(hms[0], hms[1], hms[2]).ok_or_else(|| {
            ParseError::invalid("time", format!("{}:{}:{} is not a clock time", &caps[3], &caps[4], &caps[5]))
        })?;

        let detected_at = self.nearest_clock_time(time, received_at)?;

        Ok(Some((radar_id, speed, detected_at)))
    }

    /// Place a date-less clock time on the day closest to `received_at`, so
    /// a `23:59:59` stamp received just after midnight stays in the past.
    fn nearest_clock_time(
        &self,
        time: NaiveTime,
        received_at: Timestamp,
    ) -> Result<Timestamp, ParseError> {
        let local_date = received_at.with_timezone(&self.clock_offset).date_naive();
        [local_date.pred_opt(), Some(local_date), local_date.succ_opt()]
            .into_iter()
            .flatten()
            .filter_map(|date| self.resolve_local(date.and_time(time)).ok())
            .min_by_key(|candidate| (*candidate - received_at).abs())
            .ok_or_else(|| ParseError::invalid("time", "clock time out of range"))
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Result<Timestamp, ParseError> {
        self.clock_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ParseError::invalid("timestamp", "ambiguous local time"))
    }
}

// ---------------------------------------------------------------------------
// Binary frames
// ---------------------------------------------------------------------------

/// Build a binary frame for `radar_id` and `speed` using the filler bytes
/// radars emit (`FE AF 05 01 <id> <speed> 16 EF`).
pub fn binary_frame(radar_id: u8, speed: u8) -> [u8; FRAME_LEN] {
    [
        FRAME_START,
        FRAME_MARKER,
        0x05,
        0x01,
        radar_id,
        speed,
        0x16,
        FRAME_END,
    ]
}

fn decode_binary(raw: &[u8]) -> Option<(RadarId, i32)> {
    if raw.len() < FRAME_LEN
        || raw[0] != FRAME_START
        || raw[1] != FRAME_MARKER
        || raw[FRAME_LEN - 1] != FRAME_END
    {
        return None;
    }
    let radar_id = non_zero_radar(RadarId::from(raw[FRAME_RADAR_ID_OFFSET]));
    let speed = i32::from(raw[FRAME_SPEED_OFFSET]);
    Some((radar_id, speed))
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

fn non_zero_radar(id: i32) -> RadarId {
    if id == 0 {
        FALLBACK_RADAR_ID
    } else {
        id
    }
}

/// Accept a JSON number (integral) or a numeric string as a non-negative `i32`.
fn json_int(field: &'static str, value: &Value) -> Result<i32, ParseError> {
    match value {
        Value::Number(n) => {
            let as_int = n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            });
            let v = as_int.ok_or_else(|| ParseError::invalid(field, format!("{n} is not an integer")))?;
            bounded_non_negative(field, v)
        }
        Value::String(s) => decimal_field(field, s.trim()),
        other => Err(ParseError::invalid(
            field,
            format!("expected a number, got {other}"),
        )),
    }
}

fn decimal_field(field: &'static str, s: &str) -> Result<i32, ParseError> {
    let v: i64 = s
        .parse()
        .map_err(|_| ParseError::invalid(field, format!("'{s}' is not an integer")))?;
    bounded_non_negative(field, v)
}

fn bounded_non_negative(field: &'static str, v: i64) -> Result<i32, ParseError> {
    if v < 0 {
        return Err(ParseError::invalid(field, format!("{v} is negative")));
    }
    i32::try_from(v).map_err(|_| ParseError::invalid(field, format!("{v} is out of range")))
}

fn epoch_to_timestamp(epoch: i64) -> Result<Timestamp, ParseError> {
    if epoch < 0 {
        return Err(ParseError::invalid("timestamp", "negative epoch"));
    }
    let ts = if epoch < EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp(epoch, 0)
    } else {
        DateTime::from_timestamp_millis(epoch)
    };
    ts.ok_or_else(|| ParseError::invalid("timestamp", format!("epoch {epoch} out of range")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
