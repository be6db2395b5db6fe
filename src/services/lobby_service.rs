//! Lobby handlers: hosting, joining, reconnecting and leaving rooms, plus pong intake
//! and connection teardown.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::{
    dto::ws::{self, OutboundMessage},
    error::{GameError, HOST_QUIT},
    services::{buzzer_service::load_room, event_router::EventContext},
    state::{
        ClientId, Room, SharedState,
        game::{Player, PlayerRole},
    },
};

/// Random room code of `length` uppercase letters.
fn generate_room_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect()
}

/// Create a room under a fresh code.
async fn create_room(state: &SharedState) -> Arc<Room> {
    loop {
        let code = generate_room_code(state.config().room_code_length());
        let room = Arc::new(Room::new(code, state.config()));
        if state.store().insert_room(room.clone()).await {
            return room;
        }
        debug!(room = %room.code(), "room code taken; retrying");
        room.hub().close().await;
    }
}

/// Open a new room with the calling connection as its host. Returns the room code.
pub async fn host_room(state: &SharedState, ctx: &EventContext<'_>) -> Result<String, GameError> {
    let room = create_room(state).await;
    let mut guard = room.lock().await;

    let host_id = guard.game.add_player(Player::host());
    guard.bind_client(&host_id, ctx.client.clone());
    room.hub().register(ctx.client.clone()).await;
    ctx.client.send(
        OutboundMessage::HostRoom {
            room: room.code(),
            game: &guard.game,
            id: &host_id,
        }
        .encode()?,
    );
    drop(guard);

    info!(room = %room.code(), host = %host_id, "room hosted");
    state.store().write_room(room.code(), room.clone());
    Ok(room.code().to_string())
}

/// Add a named player to an existing room.
pub async fn join_room(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let name = ctx
        .event
        .name
        .as_deref()
        .ok_or_else(|| GameError::InvalidEvent("missing name".into()))?;
    let mut guard = room.lock().await;

    let player_id = guard.game.add_player(Player::new(name));
    guard.bind_client(&player_id, ctx.client.clone());
    room.hub().register(ctx.client.clone()).await;
    ctx.client.send(
        OutboundMessage::JoinRoom {
            room: room.code(),
            game: &guard.game,
            id: &player_id,
        }
        .encode()?,
    );
    room.hub().broadcast(ws::encode_data(&guard.game)?).await;
    drop(guard);

    info!(room = %room.code(), player = %player_id, name = %name, "player joined");
    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Reattach a reconnecting device using its `ROOM:PLAYER[:TEAM]` session token.
/// Returns the room code.
pub async fn get_back_in(state: &SharedState, ctx: &EventContext<'_>) -> Result<String, GameError> {
    let session = ctx
        .event
        .session
        .as_deref()
        .ok_or_else(|| GameError::InvalidEvent("missing session".into()))?;
    let mut parts = session.split(':');
    let (Some(code), Some(player_id)) = (parts.next(), parts.next()) else {
        return Err(GameError::InvalidEvent(format!("malformed session `{session}`")));
    };
    let session_team = parts.next().and_then(|team| team.parse::<u32>().ok());

    let room = state.store().get_room(code).await?;
    let mut guard = room.lock().await;

    let player = guard.game.player(player_id)?.clone();
    guard.bind_client(player_id, ctx.client.clone());
    room.hub().register(ctx.client.clone()).await;
    ctx.client.send(
        OutboundMessage::GetBackIn {
            room: room.code(),
            game: &guard.game,
            id: player_id,
            player: &player,
            team: session_team.or(player.team),
        }
        .encode()?,
    );
    drop(guard);

    info!(room = %room.code(), player = %player_id, "player reconnected");
    state.store().write_room(room.code(), room.clone());
    Ok(room.code().to_string())
}

/// Leave a room. The host leaving closes the room for everyone.
pub async fn quit(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let player_id = ctx.event.player_id()?;

    let role = room.lock().await.game.player(player_id)?.role;
    if role == PlayerRole::Host {
        let farewell = vec![
            ws::encode_quit()?,
            ws::encode_error(HOST_QUIT, None)?,
        ];
        state.store().remove_room(room.code()).await;
        room.close(farewell).await;
        info!(room = %room.code(), "host quit; room closed");
        return Ok(());
    }

    let mut guard = room.lock().await;
    guard.stop_monitor(player_id);
    let client = guard
        .unbind_client(player_id)
        .unwrap_or_else(|| ctx.client.clone());
    client.send(ws::encode_quit()?);
    guard.game.remove_buzzes_of(player_id);
    guard.game.remove_player(player_id);
    room.hub().unregister(client.id()).await;
    room.hub().broadcast(ws::encode_data(&guard.game)?).await;
    drop(guard);

    info!(room = %room.code(), player = %player_id, "player quit");
    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Hand a pong to the player's latency monitor.
pub async fn pong(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let player_id = ctx.event.player_id()?;

    if !room.lock().await.forward_pong(player_id, ctx.received_at) {
        debug!(room = %room.code(), player = %player_id, "pong without a running monitor");
    }

    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Detach a closed connection from `code`: stop its monitors and unsubscribe it.
pub async fn disconnect(state: &SharedState, code: &str, client_id: ClientId) {
    let room = match state.store().get_room(code).await {
        Ok(room) => room,
        Err(err) => {
            debug!(room = %code, error = %err, "room gone before disconnect");
            return;
        }
    };

    let released = room.lock().await.release_client(client_id);
    room.hub().unregister(client_id).await;
    if !released.is_empty() {
        info!(room = %code, players = ?released, "players disconnected");
    }
}
