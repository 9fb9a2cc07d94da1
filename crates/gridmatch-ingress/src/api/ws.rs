//! Subscriber channel: `GET /v1/ws` upgrades to a websocket that streams
//! every feed event published after the connection opened.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::state::AppState;
use crate::hub::Subscription;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let subscription = state.hub.subscribe();
        let id = subscription.id();
        handle_socket(socket, subscription).await;
        state.hub.unsubscribe(id);
    })
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            payload = subscription.recv() => {
                // None: the hub dropped us for falling behind.
                let Some(payload) = payload else { break };
                if sender.send(Message::Text(payload.to_string().into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(subscriber = subscription.id(), "Websocket closed");
}
