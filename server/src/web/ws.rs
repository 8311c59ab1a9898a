use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::hub::{ClientFrame, HubEvent, MAX_OUTBOUND_QUEUE};

use super::app_state::AppState;

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<HubEvent>(MAX_OUTBOUND_QUEUE);

    let Some(conn_id) = state.hub.connect(tx).await else {
        return;
    };
    info!(%conn_id, "websocket connected");

    // Write loop: drain the hub's outbound queue onto the socket.
    let write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    debug!(error = %e, "failed to encode outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: decode frames, dropping anything malformed.
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => state.hub.frame(conn_id.clone(), frame),
                Err(e) => debug!(%conn_id, error = %e, "dropping unparseable frame"),
            },
            Message::Close(_) => break,
            // Binary frames are not part of the protocol; ping/pong is
            // handled by axum itself.
            _ => {}
        }
    }

    state.hub.disconnect(conn_id.clone());
    write_task.abort();
    info!(%conn_id, "websocket disconnected");
}
