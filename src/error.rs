use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::room_store::StoreError;

/// Wire code sent when an event names a player absent from the room.
pub const PLAYER_NOT_FOUND: &str = "PLAYER_NOT_FOUND";
/// Wire code sent when a message cannot be encoded or a payload decoded.
pub const SERVER_ERROR: &str = "SERVER_ERROR";
/// Wire code sent when an inbound event lacks a field its command needs.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// Wire code broadcast to a room evicted for inactivity.
pub const GAME_CLOSED: &str = "GAME_CLOSED";
/// Wire code broadcast to a room whose host left.
pub const HOST_QUIT: &str = "HOST_QUIT";

/// Errors returned by room event handlers.
///
/// Handlers abort on the first failure without rolling back side effects that already
/// happened (direct replies or broadcasts sent before the failure point). The error is
/// reported to the originating connection only.
#[derive(Debug, Error)]
pub enum GameError {
    /// The event references a player id absent from the room's player mapping.
    #[error("player `{0}` not found")]
    PlayerNotFound(String),
    /// The room store could not resolve the room.
    #[error("room lookup failed: {0}")]
    RoomLookup(#[from] StoreError),
    /// A message could not be serialized, or an inbound payload deserialized.
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The inbound event is missing or carries malformed fields.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl GameError {
    /// Error code surfaced to the client.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::PlayerNotFound(_) => PLAYER_NOT_FOUND,
            GameError::RoomLookup(err) => err.code(),
            GameError::Encoding(_) => SERVER_ERROR,
            GameError::InvalidEvent(_) => BAD_REQUEST,
        }
    }
}

impl From<ValidationErrors> for GameError {
    fn from(err: ValidationErrors) -> Self {
        GameError::InvalidEvent(format!("validation failed: {}", err))
    }
}
