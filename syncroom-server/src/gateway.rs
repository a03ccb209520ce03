use std::collections::VecDeque;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, warn};
use syncroom_collab::{Intent, SessionGateway};

use crate::{context::ServerContext, Router};

async fn upgrade(ws: WebSocketUpgrade, State(context): State<ServerContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, context))
}

/// Runs a single connection until either side goes away.
///
/// Outgoing events are written by a separate task so a slow intent never holds them up.
async fn handle_connection(socket: WebSocket, context: ServerContext) {
    let (gateway, mut events) = context.collab.connect();
    let (mut outgoing, incoming) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&*event) {
                Ok(text) => text,
                Err(error) => {
                    warn!("Could not serialize event: {}", error);
                    continue;
                }
            };

            if outgoing.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = handle_frames(&gateway, incoming) => {},
        _ = &mut send_task => {},
    }

    // Closes the session, which also ends the event stream
    drop(gateway);
    send_task.abort();
}

/// Handles incoming frames in order until the client goes away.
///
/// The socket keeps being read while an intent runs. Frames arriving meanwhile
/// wait their turn, and a close drops the intent before it takes effect.
async fn handle_frames<S>(gateway: &SessionGateway, mut incoming: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut pending = VecDeque::new();

    loop {
        let text = match pending.pop_front() {
            Some(text) => text,
            None => match next_text(gateway, &mut incoming).await {
                Some(text) => text,
                None => return,
            },
        };

        let handled = handle_text(gateway, &text);
        tokio::pin!(handled);

        loop {
            tokio::select! {
                _ = &mut handled => break,
                frame = next_text(gateway, &mut incoming) => match frame {
                    Some(text) => pending.push_back(text),
                    None => {
                        debug!("Session {} left with an intent in flight", gateway.id());
                        return;
                    }
                },
            }
        }
    }
}

/// Waits for the next text frame. Returns [None] once the connection is closed.
async fn next_text<S>(gateway: &SessionGateway, incoming: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match incoming.next().await? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(error) => {
                debug!("Session {} read error: {}", gateway.id(), error);
                return None;
            }
        }
    }
}

async fn handle_text(gateway: &SessionGateway, text: &str) {
    match serde_json::from_str::<Intent>(text) {
        Ok(intent) => gateway.handle(intent).await,
        Err(error) => {
            debug!("Malformed message from session {}: {}", gateway.id(), error);
            gateway.reject("Malformed message");
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/gateway", get(upgrade))
}
