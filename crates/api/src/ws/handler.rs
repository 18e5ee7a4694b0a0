use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /ws -- upgrade to a WebSocket that receives every bus event.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager))
}

/// Forward manager messages to the sink until the client goes away or the
/// manager drops the connection.
///
/// Dashboards only listen; inbound frames other than Close are ignored.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                return;
            }
        }
        // Dropped by the manager.
        let _ = sink.send(Message::Close(None)).await;
    });

    let receiver_conn_id = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(conn_id = %receiver_conn_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %receiver_conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ws_manager.remove(&conn_id).await;
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
