use crate::hub::{BroadcastHub, ConnectionId, Role};
use crate::metrics::RAW_RELAYED_TOTAL;
use crate::rest::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Inbound handshake and relay frames on the live channel.
enum Inbound {
    ViewerAnnounce,
    SensorRelay(Value),
    Unknown,
}

fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("type").and_then(Value::as_str) {
        Some("CLIENT") => Ok(Inbound::ViewerAnnounce),
        Some("SENSOR") => Ok(Inbound::SensorRelay(
            value.get("sensorData").cloned().unwrap_or(Value::Null),
        )),
        _ => Ok(Inbound::Unknown),
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let id = ConnectionId::new();
    info!(connection = %id, "new device connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer half: drains broadcast frames onto the socket until either
    // side goes away.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut role = None;

    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(e) => {
                warn!(connection = %id, "socket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => match parse_inbound(&text) {
                Ok(Inbound::ViewerAnnounce) => {
                    role = Some(Role::Viewer);
                    hub.register(id, Role::Viewer, tx.clone());
                }
                Ok(Inbound::SensorRelay(payload)) => {
                    if role.is_none() {
                        role = Some(Role::RawRelay);
                        hub.register(id, Role::RawRelay, tx.clone());
                    }
                    RAW_RELAYED_TOTAL.inc();
                    let delivered = hub.relay_raw(&payload);
                    debug!(connection = %id, delivered, "relayed raw sensor payload");
                }
                Ok(Inbound::Unknown) => {
                    warn!(connection = %id, "unknown message type on live channel");
                }
                // Unparseable frames are logged; the connection stays open.
                Err(e) => {
                    warn!(connection = %id, "parse error on live channel: {}", e);
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.unregister(id);
    writer.abort();
    info!(connection = %id, ?role, "disconnected");
}
