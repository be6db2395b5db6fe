use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    dao::room_store::{RoomStore, StoreError, StoreResult},
    state::Room,
};

struct StoredRoom {
    room: Arc<Room>,
    last_write: Instant,
}

/// Process-local room store. Rooms do not survive a restart.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, StoredRoom>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryRoomStore {
    fn get_room(&self, code: &str) -> BoxFuture<'static, StoreResult<Arc<Room>>> {
        let result = self
            .rooms
            .get(code)
            .map(|stored| stored.room.clone())
            .ok_or_else(|| StoreError::RoomNotFound(code.to_string()));
        Box::pin(async move { result })
    }

    fn write_room(&self, code: &str, room: Arc<Room>) {
        // Refresh only: a room removed meanwhile (evicted, host quit) stays gone.
        match self.rooms.get_mut(code) {
            Some(mut stored) if Arc::ptr_eq(&stored.room, &room) => {
                stored.last_write = Instant::now();
            }
            _ => debug!(room = %code, "skipping write for a room no longer stored"),
        }
    }

    fn insert_room(&self, room: Arc<Room>) -> BoxFuture<'static, bool> {
        let inserted = match self.rooms.entry(room.code().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(StoredRoom {
                    room,
                    last_write: Instant::now(),
                });
                true
            }
        };
        Box::pin(async move { inserted })
    }

    fn remove_room(&self, code: &str) -> BoxFuture<'static, Option<Arc<Room>>> {
        let removed = self.rooms.remove(code).map(|(_, stored)| stored.room);
        Box::pin(async move { removed })
    }

    fn evict_idle(&self, idle_for: Duration) -> BoxFuture<'static, Vec<Arc<Room>>> {
        let idle = |stored: &StoredRoom| stored.last_write.elapsed() >= idle_for;
        let candidates: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| idle(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        // Re-check on removal: a handler may have written the room meanwhile.
        let evicted = candidates
            .into_iter()
            .filter_map(|code| self.rooms.remove_if(&code, |_, stored| idle(stored)))
            .map(|(_, stored)| stored.room)
            .collect();
        Box::pin(async move { evicted })
    }

    fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
