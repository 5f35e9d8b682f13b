//! WebSocket handling for real-time updates.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use kiln_core::EngineEvent;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Push an initial snapshot of all builds, then forward every engine
/// event to the client as tagged JSON.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();

    let snapshot = json!({
        "event": "builds",
        "data": state.registry.all_builds(),
    });
    if let Ok(text) = serde_json::to_string(&snapshot) {
        if sender.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    let mut events = state.registry.events().subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if forward_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagged behind event stream");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket connection closed");
                    break;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "WebSocket error");
                    break;
                }
                // Clients only listen; other frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn forward_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &EngineEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await,
        Err(err) => {
            warn!(error = %err, "failed to serialize engine event");
            Ok(())
        }
    }
}
