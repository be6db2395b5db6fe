use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::state::Room;

/// Result alias for room store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by room stores regardless of the backing implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No room is registered under this code.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
}

impl StoreError {
    /// Error code passed through to the client.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::RoomNotFound(_) => "ROOM_NOT_FOUND",
        }
    }
}

/// Abstraction over where rooms live between events.
///
/// Handlers read a room at the start of their run and write it back at the end. Writes
/// are fire-and-forget and double as the room's activity signal.
pub trait RoomStore: Send + Sync {
    /// Resolve the room registered under `code`.
    fn get_room(&self, code: &str) -> BoxFuture<'static, StoreResult<Arc<Room>>>;
    /// Refresh the activity of `room` if it is still the room stored under `code`.
    ///
    /// Never creates an entry: [`RoomStore::insert_room`] is the only way in.
    fn write_room(&self, code: &str, room: Arc<Room>);
    /// Register a new room; `false` when its code is already taken.
    fn insert_room(&self, room: Arc<Room>) -> BoxFuture<'static, bool>;
    /// Forget the room registered under `code`.
    fn remove_room(&self, code: &str) -> BoxFuture<'static, Option<Arc<Room>>>;
    /// Remove and return every room without activity for at least `idle_for`.
    fn evict_idle(&self, idle_for: Duration) -> BoxFuture<'static, Vec<Arc<Room>>>;
    /// Number of rooms currently stored.
    fn room_count(&self) -> usize;
}
