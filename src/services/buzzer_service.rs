//! Buzzer handlers: registration, buzzing, clearing, spectator demotion and bulk
//! state updates.
//!
//! Every handler reads the room from the store, runs under the room lock, and writes
//! the room back once it succeeded. A failure aborts the handler where it happens;
//! replies and broadcasts already handed off stay sent.

use std::{sync::Arc, time::SystemTime};

use axum::extract::ws::Message;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    dto::ws,
    error::GameError,
    services::event_router::EventContext,
    state::{Room, SharedState, game::GameState},
};

/// Resolve the room named by the event through the store.
pub(crate) async fn load_room(
    state: &SharedState,
    ctx: &EventContext<'_>,
) -> Result<Arc<Room>, GameError> {
    let code = ctx.event.room_code()?;
    Ok(state.store().get_room(code).await?)
}

/// Empty the ranking, broadcast the state, then the clear notification.
pub async fn clear_buzzers(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let mut guard = room.lock().await;

    guard.game.clear_buzzers();
    room.hub().broadcast(ws::encode_data(&guard.game)?).await;
    room.hub().broadcast(ws::encode_clear_buzzers()?).await;
    drop(guard);

    info!(room = %room.code(), "buzzers cleared");
    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Register an existing player's buzzer and (re)start its latency monitor.
pub async fn register_buzzer(
    state: &SharedState,
    ctx: &EventContext<'_>,
) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let player_id = ctx.event.player_id()?;
    let mut guard = room.lock().await;

    guard
        .game
        .register_buzzer(player_id, ctx.event.team, SystemTime::now())?;

    ctx.client.send(ws::encode_ping(player_id)?);
    let prompt_sent_at = Instant::now();
    ctx.client.send(ws::encode_registered(player_id)?);

    guard.bind_client(player_id, ctx.client.clone());
    room.hub().register(ctx.client.clone()).await;
    room.hub().broadcast(ws::encode_data(&guard.game)?).await;

    guard.start_monitor(player_id, ctx.client.clone(), prompt_sent_at);
    drop(guard);

    info!(room = %room.code(), player = %player_id, team = ?ctx.event.team, "buzzer registered");
    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Rank a buzz, acknowledge it to the buzzing client and broadcast the new ranking.
pub async fn buzz(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let player_id = ctx.event.player_id()?;
    let mut guard = room.lock().await;

    let record = guard.game.record_buzz(player_id, ctx.received_at)?;
    debug!(room = %room.code(), player = %player_id, time_ms = record.time, "buzz ranked");

    ctx.client.send(ws::encode_buzzed()?);
    room.hub().broadcast(ws::encode_data(&guard.game)?).await;
    drop(guard);

    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Demote a player to spectator and subscribe its connection to broadcasts.
pub async fn register_spectator(
    state: &SharedState,
    ctx: &EventContext<'_>,
) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let player_id = ctx.event.player_id()?;
    let mut guard = room.lock().await;

    if guard.game.remove_player(player_id).is_some() {
        guard.stop_monitor(player_id);
        guard.unbind_client(player_id);
    }

    let message = ws::encode_data(&guard.game)?;
    room.hub().register(ctx.client.clone()).await;
    room.hub().broadcast(message).await;
    drop(guard);

    info!(room = %room.code(), player = %player_id, "spectator registered");
    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Apply a bulk game state update.
///
/// A round change, or the title card going down, first clears the ranking, restarts
/// the round clock and broadcasts the clear notification; the merged state follows.
pub async fn new_data(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    let payload = ctx
        .event
        .data
        .clone()
        .ok_or_else(|| GameError::InvalidEvent("missing data".into()))?;
    let incoming: GameState = serde_json::from_value(payload)?;
    let mut guard = room.lock().await;

    if guard.game.starts_new_round(&incoming) {
        guard.game.reset_round(ctx.received_at);
        room.hub().broadcast(ws::encode_clear_buzzers()?).await;
        debug!(room = %room.code(), round = incoming.round, "new round started");
    }

    guard.game.merge(incoming);
    guard.game.touch(SystemTime::now());
    guard.prune_monitors();

    room.hub().broadcast(ws::encode_data(&guard.game)?).await;
    drop(guard);

    state.store().write_room(room.code(), room.clone());
    Ok(())
}

/// Rebroadcast an event this server does not interpret, verbatim.
pub async fn send_unknown(state: &SharedState, ctx: &EventContext<'_>) -> Result<(), GameError> {
    let room = load_room(state, ctx).await?;
    room.hub()
        .broadcast(Message::Text(ctx.raw.to_string().into()))
        .await;
    Ok(())
}
