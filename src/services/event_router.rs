use tokio::time::Instant;

use crate::{
    dto::ws::{Action, InboundEvent},
    error::GameError,
    services::{buzzer_service, lobby_service},
    state::{ClientHandle, SharedState},
};

/// Everything a handler knows about the event it is running for.
pub struct EventContext<'a> {
    /// Connection the event came from; direct replies go here.
    pub client: &'a ClientHandle,
    /// Decoded event.
    pub event: &'a InboundEvent,
    /// Text frame exactly as received.
    pub raw: &'a str,
    /// When the frame was read off the socket.
    pub received_at: Instant,
}

/// Run the handler matching the event's action.
///
/// Returns the code of the room the connection is attached to afterwards, so the
/// session can detach from it on disconnect.
pub async fn dispatch(
    state: &SharedState,
    ctx: &EventContext<'_>,
) -> Result<Option<String>, GameError> {
    let attached = ctx.event.room.clone();
    match ctx.event.action {
        Action::ClearBuzzers => buzzer_service::clear_buzzers(state, ctx).await?,
        Action::RegisterBuzzer => buzzer_service::register_buzzer(state, ctx).await?,
        Action::Buzz => buzzer_service::buzz(state, ctx).await?,
        Action::RegisterSpectator => buzzer_service::register_spectator(state, ctx).await?,
        Action::NewData => buzzer_service::new_data(state, ctx).await?,
        Action::Unknown => buzzer_service::send_unknown(state, ctx).await?,
        Action::Pong => lobby_service::pong(state, ctx).await?,
        Action::HostRoom => return lobby_service::host_room(state, ctx).await.map(Some),
        Action::JoinRoom => lobby_service::join_room(state, ctx).await?,
        Action::GetBackIn => return lobby_service::get_back_in(state, ctx).await.map(Some),
        Action::Quit => lobby_service::quit(state, ctx).await?,
    }
    Ok(attached)
}
