//! WebSocket envelopes: inbound events and the outbound message constructors.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    dto::validation::validate_room_code,
    error::GameError,
    state::game::{GameState, Player},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
/// Commands a client can send.
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Empty the buzz ranking.
    #[serde(rename = "clearbuzzers")]
    ClearBuzzers,
    /// Attach a buzzer to an existing player.
    #[serde(rename = "registerbuzz")]
    RegisterBuzzer,
    /// A player pressed their buzzer.
    Buzz,
    /// Demote a player to spectator.
    #[serde(rename = "registerspectator")]
    RegisterSpectator,
    /// Bulk game state update.
    #[serde(rename = "data")]
    NewData,
    /// Answer to a latency ping.
    Pong,
    /// Open a new room.
    HostRoom,
    /// Join an existing room.
    JoinRoom,
    /// Reconnect with a session token.
    GetBackIn,
    /// Leave the room.
    Quit,
    /// Anything else; rebroadcast as received.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Validate)]
/// Event received from a client.
pub struct InboundEvent {
    /// Command to run.
    pub action: Action,
    /// Target room code.
    #[validate(custom(function = "validate_room_code"))]
    pub room: Option<String>,
    /// Player the event is about.
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    /// Team requested on buzzer registration.
    pub team: Option<u32>,
    /// Candidate game state of a bulk update.
    pub data: Option<Value>,
    /// Display name used when joining.
    #[validate(length(min = 1, max = 32))]
    pub name: Option<String>,
    /// Reconnect token, `ROOM:PLAYER[:TEAM]`.
    pub session: Option<String>,
}

impl InboundEvent {
    /// Decode and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, GameError> {
        let event: Self = serde_json::from_str(text)
            .map_err(|err| GameError::InvalidEvent(format!("malformed event: {err}")))?;
        event.validate()?;
        Ok(event)
    }

    /// Room the event targets.
    pub fn room_code(&self) -> Result<&str, GameError> {
        self.room
            .as_deref()
            .ok_or_else(|| GameError::InvalidEvent("missing room".into()))
    }

    /// Player the event is about.
    pub fn player_id(&self) -> Result<&str, GameError> {
        self.id
            .as_deref()
            .ok_or_else(|| GameError::InvalidEvent("missing id".into()))
    }
}

#[derive(Debug, Serialize)]
/// Messages sent to clients, either directly or through a room hub.
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    /// Full game state.
    Data {
        /// State to send.
        data: &'a GameState,
    },
    /// Latency probe.
    Ping {
        /// Player being probed.
        id: &'a str,
    },
    /// Buzzer registration acknowledgment.
    Registered {
        /// Registered player.
        id: &'a str,
    },
    /// Buzz acknowledgment.
    Buzzed,
    /// The buzz ranking was emptied.
    #[serde(rename = "clearbuzzers")]
    ClearBuzzers,
    /// The recipient left, or the room closed.
    Quit,
    /// Failure report.
    Error {
        /// Wire error code.
        code: &'a str,
        /// Human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Reply to a room host.
    HostRoom {
        /// New room code.
        room: &'a str,
        /// Initial game state.
        game: &'a GameState,
        /// Host player id.
        id: &'a str,
    },
    /// Reply to a joining player.
    JoinRoom {
        /// Joined room code.
        room: &'a str,
        /// Current game state.
        game: &'a GameState,
        /// New player id.
        id: &'a str,
    },
    /// Reply to a reconnecting device.
    GetBackIn {
        /// Room code.
        room: &'a str,
        /// Current game state.
        game: &'a GameState,
        /// Player id.
        id: &'a str,
        /// Player entry.
        player: &'a Player,
        /// Team from the session token, else the stored one.
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<u32>,
    },
}

impl OutboundMessage<'_> {
    /// Serialize into a text frame.
    pub fn encode(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Full game state.
pub fn encode_data(game: &GameState) -> Result<Message, serde_json::Error> {
    OutboundMessage::Data { data: game }.encode()
}

/// Latency probe addressed to `id`.
pub fn encode_ping(id: &str) -> Result<Message, serde_json::Error> {
    OutboundMessage::Ping { id }.encode()
}

/// Buzzer registration acknowledgment.
pub fn encode_registered(id: &str) -> Result<Message, serde_json::Error> {
    OutboundMessage::Registered { id }.encode()
}

/// Buzz acknowledgment.
pub fn encode_buzzed() -> Result<Message, serde_json::Error> {
    OutboundMessage::Buzzed.encode()
}

/// "Buzzers cleared" notification.
pub fn encode_clear_buzzers() -> Result<Message, serde_json::Error> {
    OutboundMessage::ClearBuzzers.encode()
}

/// Tells a client to leave the room.
pub fn encode_quit() -> Result<Message, serde_json::Error> {
    OutboundMessage::Quit.encode()
}

/// Error frame carrying `code`.
pub fn encode_error(code: &str, message: Option<String>) -> Result<Message, serde_json::Error> {
    OutboundMessage::Error { code, message }.encode()
}

/// Empty game state, sent to a room right before it is closed.
pub fn encode_cleared_data() -> Result<Message, serde_json::Error> {
    Ok(Message::Text(
        serde_json::to_string(&json!({ "action": "data", "data": {} }))?.into(),
    ))
}
