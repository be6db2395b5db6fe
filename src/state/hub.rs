//! Per-room broadcast fan-out.
//!
//! A hub is a single actor task that exclusively owns the set of registered
//! connections. Callers talk to it through a bounded inbox, so registration,
//! removal and broadcast are applied one at a time in arrival order.
//!
//! Backpressure policy: a connection whose outbound queue is full simply misses
//! that broadcast (drop-for-slow-client); it stays registered and receives later
//! messages. Connections whose writer is gone are pruned. The hub never waits on
//! a connection and never retries.

use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::state::client::{ClientHandle, ClientId, DeliveryError};

enum HubCommand {
    Register(ClientHandle),
    Unregister(ClientId),
    Broadcast(Message),
    Members(oneshot::Sender<Vec<ClientId>>),
    Shutdown,
}

#[derive(Clone, Debug)]
/// Cloneable handle onto a running hub actor.
pub struct HubHandle {
    room: Arc<str>,
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawn the hub actor for `room` with an inbox holding up to `capacity` commands.
    pub fn spawn(room: &str, capacity: usize) -> Self {
        let room: Arc<str> = Arc::from(room);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_hub(room.clone(), rx));
        Self { room, tx }
    }

    /// Add `client` to the set receiving subsequent broadcasts.
    pub async fn register(&self, client: ClientHandle) {
        self.submit(HubCommand::Register(client)).await;
    }

    /// Remove the connection `id` from the set.
    pub async fn unregister(&self, id: ClientId) {
        self.submit(HubCommand::Unregister(id)).await;
    }

    /// Hand `message` to the actor for delivery to every registered connection.
    ///
    /// Only waits for room in the inbox, never for delivery.
    pub async fn broadcast(&self, message: Message) {
        self.submit(HubCommand::Broadcast(message)).await;
    }

    /// Identifiers of the currently registered connections.
    ///
    /// Every command submitted before this call has been applied once it returns.
    pub async fn members(&self) -> Vec<ClientId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(HubCommand::Members(reply_tx)).await;
        reply_rx.await.unwrap_or_default()
    }

    /// Stop the actor after it has drained the commands already queued.
    pub async fn close(&self) {
        self.submit(HubCommand::Shutdown).await;
    }

    async fn submit(&self, command: HubCommand) {
        if self.tx.send(command).await.is_err() {
            debug!(room = %self.room, "hub is closed; dropping command");
        }
    }
}

async fn run_hub(room: Arc<str>, mut inbox: mpsc::Receiver<HubCommand>) {
    let mut clients: HashMap<ClientId, ClientHandle> = HashMap::new();

    while let Some(command) = inbox.recv().await {
        match command {
            HubCommand::Register(client) => {
                clients.insert(client.id(), client);
                debug!(room = %room, total = clients.len(), "client registered");
            }
            HubCommand::Unregister(id) => {
                if clients.remove(&id).is_some() {
                    debug!(room = %room, client = %id, total = clients.len(), "client unregistered");
                }
            }
            HubCommand::Broadcast(message) => fan_out(&room, &mut clients, &message),
            HubCommand::Members(reply) => {
                let _ = reply.send(clients.keys().copied().collect());
            }
            HubCommand::Shutdown => break,
        }
    }

    debug!(room = %room, "hub stopped");
}

fn fan_out(room: &str, clients: &mut HashMap<ClientId, ClientHandle>, message: &Message) {
    clients.retain(|id, client| match client.deliver(message.clone()) {
        Ok(()) => true,
        Err(DeliveryError::QueueFull) => {
            warn!(room = %room, client = %id, "outbound queue full; dropping broadcast for slow client");
            true
        }
        Err(DeliveryError::Closed) => {
            debug!(room = %room, client = %id, "pruning disconnected client");
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(message: &Message) -> &str {
        match message {
            Message::Text(text) => text.as_str(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let hub = HubHandle::spawn("ABCD", 8);
        let (a, mut a_rx) = ClientHandle::new(4);
        let (b, mut b_rx) = ClientHandle::new(4);

        hub.register(a).await;
        hub.register(b).await;
        hub.broadcast(Message::Text("hello".into())).await;
        hub.members().await;

        assert_eq!(text(&a_rx.try_recv().unwrap()), "hello");
        assert_eq!(text(&b_rx.try_recv().unwrap()), "hello");
    }

    #[tokio::test]
    async fn unregistered_client_stops_receiving() {
        let hub = HubHandle::spawn("ABCD", 8);
        let (a, mut a_rx) = ClientHandle::new(4);
        let a_id = a.id();

        hub.register(a).await;
        hub.unregister(a_id).await;
        hub.broadcast(Message::Text("hello".into())).await;

        assert!(hub.members().await.is_empty());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_client_does_not_block_others() {
        let hub = HubHandle::spawn("ABCD", 8);
        let (slow, mut slow_rx) = ClientHandle::new(1);
        let (fast, mut fast_rx) = ClientHandle::new(8);
        let slow_id = slow.id();

        hub.register(slow).await;
        hub.register(fast).await;
        for n in 0..3 {
            hub.broadcast(Message::Text(format!("m{n}").into())).await;
        }
        let members = hub.members().await;

        assert_eq!(text(&slow_rx.try_recv().unwrap()), "m0");
        assert!(slow_rx.try_recv().is_err());
        for n in 0..3 {
            assert_eq!(text(&fast_rx.try_recv().unwrap()), format!("m{n}"));
        }
        // Dropped messages do not evict the slow client.
        assert!(members.contains(&slow_id));
    }

    #[tokio::test]
    async fn closed_clients_are_pruned() {
        let hub = HubHandle::spawn("ABCD", 8);
        let (gone, gone_rx) = ClientHandle::new(4);
        drop(gone_rx);

        hub.register(gone).await;
        hub.broadcast(Message::Text("hello".into())).await;

        assert!(hub.members().await.is_empty());
    }
}
