//! Bus-to-WebSocket fan-out.
//!
//! [`EventBroadcaster`] subscribes to the event bus and pushes every
//! [`RadarEvent`] as a JSON text frame to all connected dashboards.

use std::sync::Arc;

use axum::extract::ws::Message;
use radarops_events::RadarEvent;
use tokio::sync::broadcast;

use crate::ws::WsManager;

pub struct EventBroadcaster {
    ws_manager: Arc<WsManager>,
}

impl EventBroadcaster {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Forward events until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<RadarEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.forward(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event broadcaster lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event broadcaster shutting down");
                    break;
                }
            }
        }
    }

    async fn forward(&self, event: &RadarEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, event_type = %event.event_type, "Failed to serialize event");
                return;
            }
        };
        let delivered = self.ws_manager.broadcast(Message::Text(text.into())).await;
        tracing::trace!(event_type = %event.event_type, delivered, "Event pushed to dashboards");
    }
}
