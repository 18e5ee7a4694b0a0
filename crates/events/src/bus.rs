//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`RadarEvent`]s. It is
//! shared via `Arc<EventBus>` between the UDP listener and the dashboard
//! WebSocket fan-out.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use radarops_core::reading::ReadingSummary;
use radarops_core::types::{DbId, RadarId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dot-separated event names.
pub mod event_types {
    pub const READING_PROCESSED: &str = "reading.processed";
    pub const DATAGRAM_REJECTED: &str = "datagram.rejected";
    pub const LISTENER_STARTED: &str = "listener.started";
    pub const LISTENER_STOPPED: &str = "listener.stopped";
}

// ---------------------------------------------------------------------------
// RadarEvent
// ---------------------------------------------------------------------------

/// Something that happened in the ingestion pipeline.
///
/// Built with [`RadarEvent::new`] and the `with_*` builders, or with one of
/// the named constructors for the pipeline's own events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarEvent {
    /// Dot-separated event name, e.g. `"reading.processed"`.
    pub event_type: String,

    pub radar_id: Option<RadarId>,

    /// `ip:port` the datagram came from, when the event concerns one.
    pub source_address: Option<String>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl RadarEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            radar_id: None,
            source_address: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_radar(mut self, radar_id: RadarId) -> Self {
        self.radar_id = Some(radar_id);
        self
    }

    pub fn with_source_address(mut self, source: SocketAddr) -> Self {
        self.source_address = Some(source.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// A reading was persisted. `fine_id` is set for violations whose fine
    /// was saved; `fine_created` is `false` when an existing fine was reused.
    pub fn reading_processed(
        summary: &ReadingSummary,
        violation: bool,
        fine_id: Option<DbId>,
        fine_created: bool,
    ) -> Self {
        Self::new(event_types::READING_PROCESSED)
            .with_radar(summary.radar_id)
            .with_payload(serde_json::json!({
                "reading": summary,
                "violation": violation,
                "fine_id": fine_id,
                "fine_created": fine_created,
            }))
    }

    /// A datagram could not be parsed. The raw bytes travel as hex.
    pub fn datagram_rejected(source: SocketAddr, raw_hex: &str, reason: &str) -> Self {
        Self::new(event_types::DATAGRAM_REJECTED)
            .with_source_address(source)
            .with_payload(serde_json::json!({
                "raw_hex": raw_hex,
                "reason": reason,
            }))
    }

    pub fn listener_started(addr: SocketAddr) -> Self {
        Self::new(event_types::LISTENER_STARTED).with_payload(serde_json::json!({
            "addr": addr.to_string(),
        }))
    }

    pub fn listener_stopped() -> Self {
        Self::new(event_types::LISTENER_STOPPED)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use radarops_events::bus::{EventBus, RadarEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(RadarEvent::listener_stopped());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<RadarEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unread events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: RadarEvent) {
        // A SendError only means there are zero receivers.
        if let Err(dropped) = self.sender.send(event) {
            tracing::trace!(event_type = %dropped.0.event_type, "Event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadarEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
