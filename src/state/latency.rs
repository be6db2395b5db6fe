//! Recurring per-player latency probe.
//!
//! A monitor pings its player's connection every interval and folds the
//! ping-to-pong round trip into the player's latency. No timeout applies to a
//! probe: a client that never answers simply keeps its previous latency.

use std::{sync::Weak, time::Duration};

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    dto::ws,
    state::{
        client::{ClientHandle, ClientId, DeliveryError},
        room::RoomState,
    },
};

/// Pongs waiting to be matched; anything beyond this is stale anyway.
const PONG_BUFFER: usize = 4;

#[derive(Debug, Clone, Copy)]
/// Probe cadence and smoothing.
pub struct LatencySettings {
    /// Delay between two pings.
    pub interval: Duration,
    /// Number of samples averaged into the latency.
    pub window: usize,
}

/// Running latency probe for one player, stopped on drop.
#[derive(Debug)]
pub struct LatencyMonitor {
    client_id: ClientId,
    token: CancellationToken,
    pongs: mpsc::Sender<Instant>,
    task: JoinHandle<()>,
}

impl LatencyMonitor {
    /// Start probing `player_id` through `client`.
    ///
    /// `prompt_sent_at` is when the registration ping went out, so the first pong is
    /// measured against it. The task only keeps a weak reference to the room state and
    /// ends on its own once the room is gone or the client disconnects.
    pub fn spawn(
        player_id: String,
        client: ClientHandle,
        room: Weak<Mutex<RoomState>>,
        settings: LatencySettings,
        prompt_sent_at: Instant,
    ) -> Self {
        let token = CancellationToken::new();
        let (pongs, pong_rx) = mpsc::channel(PONG_BUFFER);
        let client_id = client.id();
        let task = tokio::spawn(run(
            player_id,
            client,
            room,
            settings,
            token.clone(),
            pong_rx,
            prompt_sent_at,
        ));
        Self {
            client_id,
            token,
            pongs,
            task,
        }
    }

    /// Connection the monitor pings.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Hand a pong received at `at` to the probe loop.
    pub fn record_pong(&self, at: Instant) {
        if self.pongs.try_send(at).is_err() {
            debug!(client = %self.client_id, "dropping pong; monitor busy or stopped");
        }
    }

    /// Request the probe loop to stop. Stopping twice is a no-op.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the probe loop is still alive and not asked to stop.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for LatencyMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(
    player_id: String,
    client: ClientHandle,
    room: Weak<Mutex<RoomState>>,
    settings: LatencySettings,
    token: CancellationToken,
    mut pongs: mpsc::Receiver<Instant>,
    prompt_sent_at: Instant,
) {
    let mut ticker = time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut outstanding = Some(prompt_sent_at);

    debug!(player = %player_id, "latency monitor started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let ping = match ws::encode_ping(&player_id) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(player = %player_id, error = %err, "failed to encode ping; stopping monitor");
                        break;
                    }
                };
                match client.deliver(ping) {
                    // An unanswered ping keeps its send time: the next pong answers it.
                    Ok(()) => {
                        outstanding.get_or_insert_with(Instant::now);
                    }
                    Err(DeliveryError::QueueFull) => {
                        debug!(player = %player_id, "outbound queue full; skipping ping");
                    }
                    Err(DeliveryError::Closed) => {
                        debug!(player = %player_id, "client gone; stopping latency monitor");
                        break;
                    }
                }
            }
            Some(received_at) = pongs.recv() => {
                let Some(sent_at) = outstanding.take() else {
                    continue;
                };
                let Some(room) = room.upgrade() else {
                    break;
                };
                let sample = received_at.saturating_duration_since(sent_at);
                let mut state = room.lock().await;
                // Stopped while waiting for the room: a replacement may own the samples now.
                if token.is_cancelled() {
                    break;
                }
                let latency = state.game.record_latency(&player_id, sample, settings.window);
                drop(state);
                match latency {
                    Some(latency) => debug!(
                        player = %player_id,
                        sample_ms = sample.as_millis() as u64,
                        latency_ms = latency.as_millis() as u64,
                        "latency updated"
                    ),
                    None => debug!(player = %player_id, "pong for a player no longer in the room"),
                }
            }
        }
    }

    debug!(player = %player_id, "latency monitor stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;

    use super::*;
    use crate::state::game::Player;

    const INTERVAL: Duration = Duration::from_millis(1_000);

    fn settings(window: usize) -> LatencySettings {
        LatencySettings {
            interval: INTERVAL,
            window,
        }
    }

    fn room_with(player_id: &str) -> Arc<Mutex<RoomState>> {
        let room = RoomState::detached();
        room.try_lock()
            .unwrap()
            .game
            .registered_players
            .insert(player_id.into(), Player::new("Ann"));
        room
    }

    fn count_pings(rx: &mut mpsc::Receiver<Message>) -> usize {
        let mut pings = 0;
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                if text.as_str().contains("\"ping\"") {
                    pings += 1;
                }
            }
        }
        pings
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_interval() {
        let room = room_with("p1");
        let (client, mut rx) = ClientHandle::new(16);
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(5),
            Instant::now(),
        );

        settle().await;
        assert_eq!(count_pings(&mut rx), 0);

        for _ in 0..3 {
            time::advance(INTERVAL).await;
            settle().await;
        }
        assert_eq!(count_pings(&mut rx), 3);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_updates_latency() {
        let room = room_with("p1");
        let (client, _rx) = ClientHandle::new(16);
        let sent_at = Instant::now();
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(1),
            sent_at,
        );

        monitor.record_pong(sent_at + Duration::from_millis(42));
        settle().await;

        let latency = room.lock().await.game.registered_players["p1"].latency;
        assert_eq!(latency, Duration::from_millis(42));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_pong_is_ignored() {
        let room = room_with("p1");
        let (client, _rx) = ClientHandle::new(16);
        let sent_at = Instant::now();
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(1),
            sent_at,
        );

        monitor.record_pong(sent_at + Duration::from_millis(30));
        settle().await;
        monitor.record_pong(sent_at + Duration::from_millis(900));
        settle().await;

        let latency = room.lock().await.game.registered_players["p1"].latency;
        assert_eq!(latency, Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pong_is_measured_from_the_unanswered_ping() {
        let room = room_with("p1");
        let (client, mut rx) = ClientHandle::new(16);
        let sent_at = Instant::now();
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(1),
            sent_at,
        );
        settle().await;

        time::advance(INTERVAL).await;
        settle().await;
        assert_eq!(count_pings(&mut rx), 1);

        monitor.record_pong(sent_at + INTERVAL + Duration::from_millis(500));
        settle().await;

        let latency = room.lock().await.game.registered_players["p1"].latency;
        assert_eq!(latency, INTERVAL + Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_pending_on_the_room_lock_is_dropped_after_stop() {
        let room = room_with("p1");
        let (client, _rx) = ClientHandle::new(16);
        let sent_at = Instant::now();
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(1),
            sent_at,
        );
        settle().await;

        let guard = room.lock().await;
        monitor.record_pong(sent_at + Duration::from_millis(42));
        settle().await;
        monitor.stop();
        drop(guard);
        settle().await;

        let latency = room.lock().await.game.registered_players["p1"].latency;
        assert_eq!(latency, Duration::ZERO);
        assert!(monitor.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_prompt_and_idempotent() {
        let room = room_with("p1");
        let (client, mut rx) = ClientHandle::new(16);
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(5),
            Instant::now(),
        );

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());

        time::advance(INTERVAL * 3).await;
        settle().await;
        assert_eq!(count_pings(&mut rx), 0);
        assert!(monitor.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_client_ends_the_task() {
        let room = room_with("p1");
        let (client, rx) = ClientHandle::new(16);
        let monitor = LatencyMonitor::spawn(
            "p1".into(),
            client,
            Arc::downgrade(&room),
            settings(5),
            Instant::now(),
        );
        drop(rx);

        time::advance(INTERVAL).await;
        settle().await;
        assert!(!monitor.is_running());
    }
}
