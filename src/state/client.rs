use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

/// Identifier of a single WebSocket connection.
pub type ClientId = Uuid;

/// Reasons a message could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The outbound queue is at capacity; the message was dropped.
    #[error("outbound queue full")]
    QueueFull,
    /// The connection's writer is gone.
    #[error("connection closed")]
    Closed,
}

#[derive(Clone, Debug)]
/// Handle used to push messages to a connected device.
///
/// Every send is a non-blocking handoff onto a bounded queue drained by the
/// connection's writer task.
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<Message>,
}

impl ClientHandle {
    /// Create a handle with a fresh id and its outbound queue receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Connection identifier.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Try to queue `message`, reporting why it could not be queued.
    pub fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Best-effort direct send: undeliverable messages are dropped.
    pub fn send(&self, message: Message) {
        if let Err(err) = self.deliver(message) {
            debug!(client = %self.id, error = %err, "dropping direct message");
        }
    }

    /// Whether the writer side of this connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
