use std::{collections::HashSet, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{self, InboundEvent},
    services::{
        event_router::{EventContext, dispatch},
        lobby_service,
    },
    state::{ClientHandle, SharedState},
};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (client, mut outbound_rx) = ClientHandle::new(state.config().client_queue_capacity());
    let client_id = client.id();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    info!(client = %client_id, "client connected");

    // Rooms this connection attached to; detached from each on the way out.
    let mut rooms: HashSet<String> = HashSet::new();

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let received_at = Instant::now();
                debug!(client = %client_id, payload = %text.as_str(), "received client event");
                if let Some(room) = handle_text(&state, &client, text.as_str(), received_at).await {
                    rooms.insert(room);
                }
            }
            Ok(Message::Ping(payload)) => {
                client.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(client = %client_id, "client closed");
                client.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(client = %client_id, error = %err, "websocket error");
                break;
            }
        }
    }

    for room in &rooms {
        lobby_service::disconnect(&state, room, client_id).await;
    }
    info!(client = %client_id, rooms = rooms.len(), "client disconnected");

    finalize(writer_task, client).await;
}

/// Decode one text frame and run it. Handler errors are reported to `client` only.
///
/// Returns the room the connection is attached to after the event, if any.
async fn handle_text(
    state: &SharedState,
    client: &ClientHandle,
    text: &str,
    received_at: Instant,
) -> Option<String> {
    let event = match InboundEvent::from_json_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(client = %client.id(), error = %err, "failed to parse or validate client event");
            return None;
        }
    };

    let ctx = EventContext {
        client,
        event: &event,
        raw: text,
        received_at,
    };
    match dispatch(state, &ctx).await {
        Ok(room) => room,
        Err(err) => {
            warn!(
                client = %client.id(),
                action = ?event.action,
                error = %err,
                "error while handling client event"
            );
            match ws::encode_error(err.code(), Some(err.to_string())) {
                Ok(reply) => client.send(reply),
                Err(err) => warn!(error = %err, "failed to encode error reply"),
            }
            None
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
///
/// Room tasks may still hold clones of the handle for a moment, so the writer is told
/// to stop explicitly instead of waiting for every sender to go away.
async fn finalize(mut writer_task: JoinHandle<()>, client: ClientHandle) {
    client.send(Message::Close(None));
    drop(client);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
        .await
        .is_err()
    {
        debug!("writer task did not drain in time; aborting");
        writer_task.abort();
    }
}
