//! Periodic eviction of rooms nobody has touched for a while.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::{
    dto::ws,
    error::GAME_CLOSED,
    state::{Room, SharedState},
};

/// Sweep idle rooms forever, once per configured sweep interval.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().room_sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let evicted = sweep(&state).await;
        if evicted > 0 {
            info!(evicted, remaining = state.store().room_count(), "evicted idle rooms");
        }
    }
}

/// Evict every room idle for longer than the configured timeout and close it.
/// Returns how many rooms were evicted.
pub async fn sweep(state: &SharedState) -> usize {
    let rooms = state
        .store()
        .evict_idle(state.config().room_idle_timeout())
        .await;
    for room in &rooms {
        close_idle_room(room).await;
    }
    rooms.len()
}

/// Tell the room's members the game is gone, then shut the room down.
async fn close_idle_room(room: &Room) {
    let farewell = match (
        ws::encode_cleared_data(),
        ws::encode_error(GAME_CLOSED, None),
    ) {
        (Ok(data), Ok(error)) => vec![data, error],
        (Err(err), _) | (_, Err(err)) => {
            warn!(room = %room.code(), error = %err, "failed to encode closing messages");
            Vec::new()
        }
    };
    room.close(farewell).await;
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use tokio::time::Instant;

    use super::*;
    use crate::{
        dto::ws::InboundEvent,
        services::{
            buzzer_service::tests::{Harness, ROOM, actions, drain},
            event_router::{EventContext, dispatch},
        },
        state::ClientHandle,
    };

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_rooms_are_closed_and_evicted() {
        let harness = Harness::with_players(&[]).await;
        let (_listener, mut listener_rx) = harness.listener().await;

        assert_eq!(sweep(&harness.state).await, 0);

        tokio::time::advance(harness.state.config().room_idle_timeout() + Duration::from_secs(1))
            .await;
        assert_eq!(sweep(&harness.state).await, 1);
        harness.flush().await;

        let frames = drain(&mut listener_rx);
        assert_eq!(actions(&frames), vec!["data", "error"]);
        assert_eq!(frames[0]["data"], json!({}));
        assert_eq!(frames[1]["code"], json!(GAME_CLOSED));
        assert!(harness.state.store().get_room(ROOM).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn recently_written_rooms_survive() {
        let harness = Harness::with_players(&[]).await;
        let timeout = harness.state.config().room_idle_timeout();

        tokio::time::advance(timeout - Duration::from_secs(1)).await;
        harness
            .state
            .store()
            .write_room(ROOM, Arc::clone(&harness.room));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(sweep(&harness.state).await, 0);
        assert_eq!(harness.state.store().room_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_finishing_after_eviction_does_not_bring_the_room_back() {
        let harness = Harness::with_players(&[("a", 0)]).await;
        let guard = harness.room.lock().await;

        let state = harness.state.clone();
        let pong = tokio::spawn(async move {
            let (client, _rx) = ClientHandle::new(4);
            let raw = json!({ "action": "pong", "room": ROOM, "id": "a" }).to_string();
            let event = InboundEvent::from_json_str(&raw).unwrap();
            let ctx = EventContext {
                client: &client,
                event: &event,
                raw: &raw,
                received_at: Instant::now(),
            };
            dispatch(&state, &ctx).await
        });
        settle().await;

        tokio::time::advance(harness.state.config().room_idle_timeout() + Duration::from_secs(1))
            .await;
        let state = harness.state.clone();
        let sweeper = tokio::spawn(async move { sweep(&state).await });
        settle().await;
        assert_eq!(harness.state.store().room_count(), 0);

        drop(guard);
        assert!(pong.await.unwrap().is_ok());
        assert_eq!(sweeper.await.unwrap(), 1);

        assert!(harness.state.store().get_room(ROOM).await.is_err());
        let (joiner, _rx) = ClientHandle::new(8);
        let raw = json!({ "action": "join_room", "room": ROOM, "name": "Late" }).to_string();
        let err = harness.send(&joiner, &raw, Instant::now()).await.unwrap_err();
        assert_eq!(err.code(), "ROOM_NOT_FOUND");
    }
}
