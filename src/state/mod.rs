/// Latency-compensated buzz ordering.
pub mod buzz;
/// Per-connection outbound handle.
pub mod client;
/// Game state model.
pub mod game;
/// Per-room broadcast hub.
pub mod hub;
/// Per-player latency probe.
pub mod latency;
/// Rooms and their serialized state.
pub mod room;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{memory::MemoryRoomStore, room_store::RoomStore},
};

pub use self::client::{ClientHandle, ClientId};
pub use self::room::{Room, RoomState};

/// Shared handle on the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration and the room store every handler goes through.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RoomStore>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, store: Arc<dyn RoomStore>) -> SharedState {
        Arc::new(Self { config, store })
    }

    /// Application state backed by the in-process room store.
    pub fn in_memory(config: AppConfig) -> SharedState {
        Self::new(config, Arc::new(MemoryRoomStore::new()))
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Room store used to resolve and persist rooms.
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }
}
