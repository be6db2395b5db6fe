use std::{
    collections::VecDeque,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DurationMilliSeconds, TimestampMilliSeconds, formats::Flexible, serde_as};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::GameError,
    state::buzz::{self, BuzzRecord},
};

/// Whether a room member runs the game or plays it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    /// The game master's board.
    Host,
    /// A competing player with a buzzer.
    #[default]
    Player,
}

/// Player info tracked during a game session.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Host or player.
    #[serde(default)]
    pub role: PlayerRole,
    /// Display name chosen when joining.
    #[serde(default)]
    pub name: String,
    /// Team the player buzzes for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<u32>,
    /// Measured round-trip latency.
    #[serde_as(as = "DurationMilliSeconds<u64, Flexible>")]
    #[serde(default)]
    pub latency: Duration,
    /// When the player last registered their buzzer.
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<SystemTime>,
    #[serde(skip)]
    samples: VecDeque<Duration>,
}

impl Player {
    /// A competing player entry named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The host entry of a room.
    pub fn host() -> Self {
        Self {
            role: PlayerRole::Host,
            ..Self::default()
        }
    }

    fn record_sample(&mut self, sample: Duration, window: usize) -> Duration {
        while self.samples.len() >= window.max(1) {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        let total: Duration = self.samples.iter().sum();
        self.latency = total / self.samples.len() as u32;
        self.latency
    }
}

/// Score and strikes of one team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    /// Display name.
    pub name: String,
    /// Accumulated points.
    pub points: i64,
    /// Strikes in the current round.
    pub mistakes: u32,
}

impl Team {
    fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An answer on a round's board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Answer {
    /// Answer text.
    pub ans: String,
    /// Points awarded.
    pub pnt: i64,
    /// Whether the answer was revealed.
    pub trig: bool,
}

/// One question of the main game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Round {
    /// Question text.
    pub question: String,
    /// Point multiplier.
    pub multiply: u32,
    /// Answers on the board.
    pub answers: Vec<Answer>,
}

impl Default for Round {
    fn default() -> Self {
        Self {
            question: String::new(),
            multiply: 1,
            answers: Vec::new(),
        }
    }
}

/// One question of the final round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalRoundQuestion {
    /// Question text.
    pub question: String,
    /// Possible answers with their points.
    pub answers: Vec<(String, i64)>,
    /// Index of the selected answer.
    pub selection: i64,
    /// What the contestant typed.
    pub input: String,
    /// Whether the answer was shown.
    pub revealed: bool,
}

/// The room's shared game state, broadcast to every client after each change.
///
/// The buzz ranking and the round start instant are owned by the server: they are
/// never read from an inbound payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    /// Room code.
    pub room: String,
    /// Index of the current round.
    pub round: u32,
    /// Main game questions.
    pub rounds: Vec<Round>,
    /// First stage of the final round.
    pub final_round: Vec<FinalRoundQuestion>,
    /// Second stage of the final round.
    pub final_round_2: Vec<FinalRoundQuestion>,
    /// Hide the first-round board until revealed.
    pub hide_first_round: bool,
    /// Final round is active.
    pub is_final_round: bool,
    /// Second stage of the final round is active.
    pub is_final_second: bool,
    /// Points per round.
    pub point_tracker: Vec<i64>,
    /// Free-form display settings.
    pub settings: Map<String, Value>,
    /// Competing teams.
    pub teams: Vec<Team>,
    /// Title card shown instead of the board.
    pub title: bool,
    /// Text of the title card.
    pub title_text: String,
    /// Room members keyed by player id.
    #[serde(rename = "registeredPlayers")]
    pub registered_players: IndexMap<String, Player>,
    #[serde(skip_deserializing)]
    buzzed: Vec<BuzzRecord>,
    #[serde(skip, default = "Instant::now")]
    round_start: Instant,
    /// Last bulk update, in epoch milliseconds.
    #[serde(skip_deserializing)]
    pub tick: u64,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            room: String::new(),
            round: 0,
            rounds: Vec::new(),
            final_round: Vec::new(),
            final_round_2: Vec::new(),
            hide_first_round: false,
            is_final_round: false,
            is_final_second: false,
            point_tracker: Vec::new(),
            settings: Map::new(),
            teams: Vec::new(),
            title: false,
            title_text: String::new(),
            registered_players: IndexMap::new(),
            buzzed: Vec::new(),
            round_start: Instant::now(),
            tick: 0,
        }
    }
}

impl GameState {
    /// Lobby state of a freshly hosted room: title card up, two empty teams.
    pub fn new(room: &str) -> Self {
        let mut settings = Map::new();
        settings.insert("logo_url".into(), Value::Null);
        settings.insert("hide_questions".into(), Value::Bool(true));
        settings.insert("theme".into(), Value::String("default".into()));
        settings.insert("final_round_title".into(), Value::Null);

        Self {
            room: room.into(),
            settings,
            teams: vec![Team::named("Team 1"), Team::named("Team 2")],
            title: true,
            ..Self::default()
        }
    }

    /// Current buzz ranking, fastest first.
    pub fn buzzed(&self) -> &[BuzzRecord] {
        &self.buzzed
    }

    /// Instant the current round started.
    pub fn round_start(&self) -> Instant {
        self.round_start
    }

    /// Empty the buzz ranking.
    pub fn clear_buzzers(&mut self) {
        self.buzzed.clear();
    }

    /// Rank a buzz from `player_id` received at `now`.
    ///
    /// Fails with [`GameError::PlayerNotFound`] without touching the ranking when the
    /// player is not registered. Repeated buzzes from one player are all kept.
    pub fn record_buzz(&mut self, player_id: &str, now: Instant) -> Result<BuzzRecord, GameError> {
        let player = self
            .registered_players
            .get(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.into()))?;
        let record = BuzzRecord {
            id: player_id.into(),
            time: buzz::compensated_ms(self.round_start, now, player.latency),
        };
        buzz::insert_ordered(&mut self.buzzed, record.clone());
        Ok(record)
    }

    /// Drop every ranking entry of `player_id`.
    pub fn remove_buzzes_of(&mut self, player_id: &str) {
        self.buzzed.retain(|record| record.id != player_id);
    }

    /// Whether applying `incoming` begins a new round: the round number changes, or the
    /// title card is taken down.
    pub fn starts_new_round(&self, incoming: &GameState) -> bool {
        self.round != incoming.round || (self.title && !incoming.title)
    }

    /// Clear the ranking and restart the round clock at `now`.
    pub fn reset_round(&mut self, now: Instant) {
        self.buzzed.clear();
        self.round_start = now;
    }

    /// Overwrite every client-owned field with the one from `incoming`.
    ///
    /// Field-level replacement, not a deep merge. Ranking, round clock, room code and
    /// tick stay untouched.
    pub fn merge(&mut self, incoming: GameState) {
        let GameState {
            round,
            rounds,
            final_round,
            final_round_2,
            hide_first_round,
            is_final_round,
            is_final_second,
            point_tracker,
            settings,
            teams,
            title,
            title_text,
            registered_players,
            ..
        } = incoming;

        self.round = round;
        self.rounds = rounds;
        self.final_round = final_round;
        self.final_round_2 = final_round_2;
        self.hide_first_round = hide_first_round;
        self.is_final_round = is_final_round;
        self.is_final_second = is_final_second;
        self.point_tracker = point_tracker;
        self.settings = settings;
        self.teams = teams;
        self.title = title;
        self.title_text = title_text;
        self.registered_players = registered_players;
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: SystemTime) {
        self.tick = now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
    }

    /// Add `player` under a fresh unique id and return that id.
    pub fn add_player(&mut self, player: Player) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        while self.registered_players.contains_key(&id) {
            id = Uuid::new_v4().simple().to_string();
        }
        self.registered_players.insert(id.clone(), player);
        id
    }

    /// Look up a player.
    pub fn player(&self, player_id: &str) -> Result<&Player, GameError> {
        self.registered_players
            .get(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.into()))
    }

    /// Assign `team` to an existing player, stamp its registration and reset its latency samples.
    pub fn register_buzzer(
        &mut self,
        player_id: &str,
        team: Option<u32>,
        at: SystemTime,
    ) -> Result<(), GameError> {
        let player = self
            .registered_players
            .get_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.into()))?;
        player.team = team;
        player.start = Some(at);
        player.samples.clear();
        Ok(())
    }

    /// Fold a round-trip `sample` into the player's latency, averaging the last `window`
    /// samples. Returns the new latency, or `None` if the player is gone.
    pub fn record_latency(
        &mut self,
        player_id: &str,
        sample: Duration,
        window: usize,
    ) -> Option<Duration> {
        self.registered_players
            .get_mut(player_id)
            .map(|player| player.record_sample(sample, window))
    }

    /// Remove a player entry.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        self.registered_players.shift_remove(player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with(players: &[(&str, u64)]) -> GameState {
        let mut game = GameState::new("ABCD");
        for (id, latency_ms) in players {
            let mut player = Player::new(*id);
            player.latency = Duration::from_millis(*latency_ms);
            game.registered_players.insert((*id).into(), player);
        }
        game
    }

    #[test]
    fn unknown_player_buzz_leaves_ranking_untouched() {
        let mut game = state_with(&[("a", 0)]);
        let start = game.round_start();
        game.record_buzz("a", start + Duration::from_millis(10)).unwrap();

        let err = game
            .record_buzz("ghost", start + Duration::from_millis(5))
            .unwrap_err();

        assert!(matches!(err, GameError::PlayerNotFound(id) if id == "ghost"));
        assert_eq!(game.buzzed().len(), 1);
        assert_eq!(game.buzzed()[0].id, "a");
    }

    #[test]
    fn buzzes_are_ranked_by_compensated_time() {
        let mut game = state_with(&[("a", 50), ("b", 0)]);
        let start = game.round_start();

        game.record_buzz("a", start + Duration::from_millis(300)).unwrap();
        game.record_buzz("b", start + Duration::from_millis(260)).unwrap();

        let ranking: Vec<(&str, u64)> = game
            .buzzed()
            .iter()
            .map(|b| (b.id.as_str(), b.time))
            .collect();
        assert_eq!(ranking, vec![("a", 250), ("b", 260)]);
    }

    #[test]
    fn round_change_is_detected() {
        let game = state_with(&[]);
        let mut incoming = game.clone();
        assert!(!game.starts_new_round(&incoming));

        incoming.round = 1;
        assert!(game.starts_new_round(&incoming));
    }

    #[test]
    fn only_title_true_to_false_starts_a_round() {
        let mut game = state_with(&[]);
        let mut incoming = game.clone();

        game.title = true;
        incoming.title = false;
        assert!(game.starts_new_round(&incoming));

        game.title = false;
        incoming.title = true;
        assert!(!game.starts_new_round(&incoming));

        incoming.title = false;
        assert!(!game.starts_new_round(&incoming));
    }

    #[test]
    fn payload_cannot_inject_ranking() {
        let incoming: GameState = serde_json::from_value(json!({
            "round": 2,
            "title": false,
            "buzzed": [{ "id": "cheater", "time": 0 }],
            "tick": 42,
            "registeredPlayers": {
                "p1": { "role": "player", "name": "Ann", "latency": 12, "team": 1 }
            }
        }))
        .unwrap();

        assert!(incoming.buzzed().is_empty());
        assert_eq!(incoming.tick, 0);
        let player = &incoming.registered_players["p1"];
        assert_eq!(player.latency, Duration::from_millis(12));
        assert_eq!(player.team, Some(1));
    }

    #[test]
    fn merge_replaces_fields_but_keeps_server_owned_ones() {
        let mut game = state_with(&[("a", 0)]);
        let start = game.round_start();
        game.record_buzz("a", start + Duration::from_millis(100)).unwrap();

        let mut incoming = GameState::default();
        incoming.round = 3;
        incoming.title_text = "Final".into();
        incoming.teams = vec![Team::named("Blue")];
        incoming.room = "ZZZZ".into();

        game.merge(incoming);

        assert_eq!(game.round, 3);
        assert_eq!(game.title_text, "Final");
        assert_eq!(game.teams, vec![Team::named("Blue")]);
        assert!(game.registered_players.is_empty());
        assert_eq!(game.room, "ABCD");
        assert_eq!(game.buzzed().len(), 1);
        assert_eq!(game.round_start(), start);
    }

    #[test]
    fn reset_round_clears_and_restarts_clock() {
        let mut game = state_with(&[("a", 0)]);
        let start = game.round_start();
        game.record_buzz("a", start + Duration::from_millis(100)).unwrap();

        let later = start + Duration::from_secs(30);
        game.reset_round(later);

        assert!(game.buzzed().is_empty());
        assert_eq!(game.round_start(), later);
    }

    #[test]
    fn latency_averages_over_window() {
        let mut game = state_with(&[("a", 0)]);

        for ms in [10, 20, 30] {
            game.record_latency("a", Duration::from_millis(ms), 2);
        }

        assert_eq!(
            game.registered_players["a"].latency,
            Duration::from_millis(25)
        );
        assert_eq!(game.record_latency("ghost", Duration::from_millis(5), 2), None);
    }

    #[test]
    fn window_of_one_replaces() {
        let mut game = state_with(&[("a", 0)]);
        game.record_latency("a", Duration::from_millis(80), 1);
        game.record_latency("a", Duration::from_millis(30), 1);
        assert_eq!(
            game.registered_players["a"].latency,
            Duration::from_millis(30)
        );
    }

    #[test]
    fn register_buzzer_requires_existing_player() {
        let mut game = state_with(&[("a", 0)]);

        let err = game
            .register_buzzer("ghost", Some(1), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, GameError::PlayerNotFound(_)));
        assert!(!game.registered_players.contains_key("ghost"));

        game.register_buzzer("a", Some(2), SystemTime::now()).unwrap();
        assert_eq!(game.registered_players["a"].team, Some(2));
        assert!(game.registered_players["a"].start.is_some());
    }

    #[test]
    fn serializes_with_wire_keys() {
        let game = state_with(&[("a", 40)]);
        let value = serde_json::to_value(&game).unwrap();

        assert_eq!(value["registeredPlayers"]["a"]["latency"], json!(40));
        assert_eq!(value["buzzed"], json!([]));
        assert_eq!(value["title"], json!(true));
        assert!(value.get("round_start").is_none());
    }
}
