use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use axum::extract::ws::Message;
use tokio::{
    sync::{Mutex, MutexGuard},
    time::Instant,
};
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    state::{
        client::{ClientHandle, ClientId},
        game::GameState,
        hub::HubHandle,
        latency::{LatencyMonitor, LatencySettings},
    },
};

/// One game session: its hub, its game state and the connections bound to its players.
///
/// Handlers hold the [`RoomState`] lock for their whole run, which serializes every
/// mutation of a room.
pub struct Room {
    code: String,
    hub: HubHandle,
    state: Arc<Mutex<RoomState>>,
}

/// Mutable part of a [`Room`], guarded by the room lock.
pub struct RoomState {
    /// Shared game state.
    pub game: GameState,
    clients: HashMap<String, ClientHandle>,
    monitors: HashMap<String, LatencyMonitor>,
    latency: LatencySettings,
    this: Weak<Mutex<RoomState>>,
}

impl Room {
    /// Create a room with a fresh lobby game state and spawn its hub.
    pub fn new(code: impl Into<String>, config: &AppConfig) -> Self {
        let code = code.into();
        let hub = HubHandle::spawn(&code, config.hub_inbox_capacity());
        let latency = LatencySettings {
            interval: config.ping_interval(),
            window: config.latency_window(),
        };
        let state = RoomState::new_shared(GameState::new(&code), latency);
        Self { code, hub, state }
    }

    /// Room code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The room's broadcast hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Enter the room's serialization domain.
    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }

    /// Stop every latency monitor, broadcast `farewell` and shut the hub down.
    pub async fn close(&self, farewell: Vec<Message>) {
        let mut state = self.lock().await;
        state.stop_all_monitors();
        for message in farewell {
            self.hub.broadcast(message).await;
        }
        self.hub.close().await;
        info!(room = %self.code, "room closed");
    }
}

impl RoomState {
    fn new_shared(game: GameState, latency: LatencySettings) -> Arc<Mutex<Self>> {
        Arc::new_cyclic(|this| {
            Mutex::new(Self {
                game,
                clients: HashMap::new(),
                monitors: HashMap::new(),
                latency,
                this: this.clone(),
            })
        })
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Arc<Mutex<Self>> {
        Self::new_shared(
            GameState::new("TEST"),
            LatencySettings {
                interval: std::time::Duration::from_secs(5),
                window: 5,
            },
        )
    }

    /// Bind `player_id` to the connection that speaks for it.
    pub fn bind_client(&mut self, player_id: &str, client: ClientHandle) {
        self.clients.insert(player_id.into(), client);
    }

    /// Connection bound to `player_id`, if any.
    pub fn client(&self, player_id: &str) -> Option<&ClientHandle> {
        self.clients.get(player_id)
    }

    /// Remove the binding of `player_id`.
    pub fn unbind_client(&mut self, player_id: &str) -> Option<ClientHandle> {
        self.clients.remove(player_id)
    }

    /// (Re)start the latency monitor of `player_id`.
    ///
    /// A monitor already running for the player is stopped before the new one is
    /// spawned, so a player never has two probes at once.
    pub fn start_monitor(&mut self, player_id: &str, client: ClientHandle, prompt_sent_at: Instant) {
        if let Some(previous) = self.monitors.remove(player_id) {
            previous.stop();
            debug!(player = %player_id, "replaced running latency monitor");
        }
        let monitor = LatencyMonitor::spawn(
            player_id.into(),
            client,
            self.this.clone(),
            self.latency,
            prompt_sent_at,
        );
        self.monitors.insert(player_id.into(), monitor);
    }

    /// Stop the monitor of `player_id`. Returns whether one existed.
    pub fn stop_monitor(&mut self, player_id: &str) -> bool {
        match self.monitors.remove(player_id) {
            Some(monitor) => {
                monitor.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every monitor of the room.
    pub fn stop_all_monitors(&mut self) {
        for (_, monitor) in self.monitors.drain() {
            monitor.stop();
        }
    }

    /// Stop monitors of players no longer in the game state.
    pub fn prune_monitors(&mut self) {
        let players = &self.game.registered_players;
        self.monitors.retain(|player_id, monitor| {
            let keep = players.contains_key(player_id);
            if !keep {
                monitor.stop();
            }
            keep
        });
    }

    /// Detach a disconnected connection: unbind it from its players and stop the
    /// monitors pinging it. Player entries stay so the device can come back.
    pub fn release_client(&mut self, client_id: ClientId) -> Vec<String> {
        let released: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, client)| client.id() == client_id)
            .map(|(player_id, _)| player_id.clone())
            .collect();
        for player_id in &released {
            self.clients.remove(player_id);
        }
        self.monitors.retain(|_, monitor| {
            let keep = monitor.client_id() != client_id;
            if !keep {
                monitor.stop();
            }
            keep
        });
        released
    }

    /// Forward a pong to the player's monitor. Returns whether a monitor took it.
    pub fn forward_pong(&self, player_id: &str, received_at: Instant) -> bool {
        match self.monitors.get(player_id) {
            Some(monitor) => {
                monitor.record_pong(received_at);
                true
            }
            None => false,
        }
    }

    /// Number of monitors still running.
    pub fn running_monitors(&self) -> usize {
        self.monitors
            .values()
            .filter(|monitor| monitor.is_running())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::Player;

    #[tokio::test]
    async fn restarting_a_monitor_stops_the_previous_one() {
        let shared = RoomState::detached();
        let mut state = shared.lock().await;
        state
            .game
            .registered_players
            .insert("p1".into(), Player::new("Ann"));
        let (client, _rx) = ClientHandle::new(8);

        state.start_monitor("p1", client.clone(), Instant::now());
        state.start_monitor("p1", client, Instant::now());

        assert_eq!(state.monitors.len(), 1);
        assert_eq!(state.running_monitors(), 1);
    }

    #[tokio::test]
    async fn release_client_unbinds_and_stops_its_monitors() {
        let shared = RoomState::detached();
        let mut state = shared.lock().await;
        let (mine, _mine_rx) = ClientHandle::new(8);
        let (other, _other_rx) = ClientHandle::new(8);

        state.bind_client("p1", mine.clone());
        state.bind_client("p2", other.clone());
        state.start_monitor("p1", mine.clone(), Instant::now());
        state.start_monitor("p2", other, Instant::now());

        let released = state.release_client(mine.id());

        assert_eq!(released, vec!["p1".to_string()]);
        assert!(state.client("p1").is_none());
        assert!(state.client("p2").is_some());
        assert!(!state.forward_pong("p1", Instant::now()));
        assert!(state.forward_pong("p2", Instant::now()));
    }

    #[tokio::test]
    async fn prune_stops_monitors_of_removed_players() {
        let shared = RoomState::detached();
        let mut state = shared.lock().await;
        let (client, _rx) = ClientHandle::new(8);
        state
            .game
            .registered_players
            .insert("p1".into(), Player::new("Ann"));

        state.start_monitor("p1", client.clone(), Instant::now());
        state.start_monitor("gone", client, Instant::now());
        state.prune_monitors();

        assert_eq!(state.running_monitors(), 1);
        assert!(!state.stop_monitor("gone"));
        assert!(state.stop_monitor("p1"));
        assert!(!state.stop_monitor("p1"));
    }
}
