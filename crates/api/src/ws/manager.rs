use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use radarops_core::types::Timestamp;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Messages a connection may have queued before it counts as lagging.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

pub struct WsConnection {
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Tracks every open dashboard connection.
///
/// Interior `RwLock`; share it behind an `Arc`. A connection whose buffer
/// is full when a broadcast arrives is dropped.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
    buffer: usize,
}

impl WsManager {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return the receiver its writer drains.
    ///
    /// The receiver yields `None` once the connection has been dropped.
    pub async fn add(&self, conn_id: String) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id, connected_secs, "WebSocket connection removed");
        }
    }

    /// Send a message to every connection.
    ///
    /// Returns how many connections accepted it. Closed channels are
    /// skipped; their receive loops remove them. Lagging connections are
    /// removed here.
    pub async fn broadcast(&self, message: Message) -> usize {
        let mut lagging = Vec::new();
        let delivered = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .filter(|(conn_id, conn)| match conn.sender.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        lagging.push((*conn_id).clone());
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                })
                .count()
        };

        if !lagging.is_empty() {
            let mut conns = self.connections.write().await;
            for conn_id in lagging {
                if conns.remove(&conn_id).is_some() {
                    tracing::warn!(conn_id = %conn_id, buffer = self.buffer, "WebSocket connection lagging, dropped");
                }
            }
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let manager = WsManager::new();
        let mut a = manager.add("a".into()).await;
        let mut b = manager.add("b".into()).await;
        assert_eq!(manager.connection_count().await, 2);

        let sent = manager.broadcast(Message::Text("hello".into())).await;
        assert_eq!(sent, 2);
        assert!(matches!(a.recv().await, Some(Message::Text(t)) if t.as_str() == "hello"));
        assert!(matches!(b.recv().await, Some(Message::Text(t)) if t.as_str() == "hello"));
    }

    #[tokio::test]
    async fn closed_receivers_are_skipped() {
        let manager = WsManager::new();
        let rx = manager.add("gone".into()).await;
        drop(rx);
        let _live = manager.add("live".into()).await;

        assert_eq!(manager.broadcast(Message::Text("x".into())).await, 1);
    }

    #[tokio::test]
    async fn lagging_connection_is_dropped() {
        let manager = WsManager::with_buffer(2);
        let mut slow = manager.add("slow".into()).await;
        let mut fast = manager.add("fast".into()).await;

        for n in 0..3 {
            let sent = manager.broadcast(Message::Text(format!("event {n}").into())).await;
            assert!(matches!(fast.recv().await, Some(Message::Text(_))));
            assert_eq!(sent, if n < 2 { 2 } else { 1 });
        }
        assert_eq!(manager.connection_count().await, 1);

        // Buffered messages drain, then the channel ends.
        assert!(matches!(slow.recv().await, Some(Message::Text(t)) if t.as_str() == "event 0"));
        assert!(matches!(slow.recv().await, Some(Message::Text(t)) if t.as_str() == "event 1"));
        assert!(slow.recv().await.is_none());

        assert_eq!(manager.broadcast(Message::Text("later".into())).await, 1);
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let manager = WsManager::new();
        let mut rx = manager.add("a".into()).await;
        manager.shutdown_all().await;

        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert_eq!(manager.connection_count().await, 0);
        manager.remove("a").await;
    }
}
