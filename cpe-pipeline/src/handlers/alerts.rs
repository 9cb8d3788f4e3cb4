//! Real-time anomaly alerts over WebSocket

use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};

use crate::AppState;
use crate::fanout::{BroadcastHub, Subscription};

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| stream_alerts(socket, state.hub))
}

async fn stream_alerts(mut socket: WebSocket, hub: Arc<BroadcastHub>) {
    let Subscription { id, mut receiver } = hub.subscribe();

    loop {
        tokio::select! {
            alert = receiver.recv() => match alert {
                Some(text) => {
                    if socket.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
}
