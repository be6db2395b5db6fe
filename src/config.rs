//! Application-level configuration loading: latency probing cadence, queue capacities and
//! room eviction timings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BUZZ_ROOM_CONFIG_PATH";

const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;
const DEFAULT_LATENCY_WINDOW: usize = 5;
const DEFAULT_HUB_INBOX_CAPACITY: usize = 64;
const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 32;
const DEFAULT_ROOM_IDLE_TIMEOUT_SECS: u64 = 60 * 60;
const DEFAULT_ROOM_SWEEP_INTERVAL_SECS: u64 = 10;
const DEFAULT_ROOM_CODE_LENGTH: usize = 4;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    ping_interval: Duration,
    latency_window: usize,
    hub_inbox_capacity: usize,
    client_queue_capacity: usize,
    room_idle_timeout: Duration,
    room_sweep_interval: Duration,
    room_code_length: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        ping_interval_ms = app_config.ping_interval.as_millis() as u64,
                        latency_window = app_config.latency_window,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Delay between two latency probes sent to the same player.
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Number of round-trip samples averaged into a player's latency.
    pub fn latency_window(&self) -> usize {
        self.latency_window
    }

    /// Capacity of each room hub's command inbox.
    pub fn hub_inbox_capacity(&self) -> usize {
        self.hub_inbox_capacity
    }

    /// Capacity of each connection's outbound message queue.
    pub fn client_queue_capacity(&self) -> usize {
        self.client_queue_capacity
    }

    /// Inactivity after which a room is evicted.
    pub fn room_idle_timeout(&self) -> Duration {
        self.room_idle_timeout
    }

    /// How often the idle-room sweeper runs.
    pub fn room_sweep_interval(&self) -> Duration {
        self.room_sweep_interval
    }

    /// Number of letters in generated room codes.
    pub fn room_code_length(&self) -> usize {
        self.room_code_length
    }

    /// Override the ping interval, used by tests and embedders.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    ping_interval_ms: Option<u64>,
    latency_window: Option<usize>,
    hub_inbox_capacity: Option<usize>,
    client_queue_capacity: Option<usize>,
    room_idle_timeout_secs: Option<u64>,
    room_sweep_interval_secs: Option<u64>,
    room_code_length: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        // Zero capacities or intervals would panic inside tokio, clamp them to 1.
        Self {
            ping_interval: Duration::from_millis(
                value
                    .ping_interval_ms
                    .unwrap_or(DEFAULT_PING_INTERVAL_MS)
                    .max(1),
            ),
            latency_window: value.latency_window.unwrap_or(DEFAULT_LATENCY_WINDOW).max(1),
            hub_inbox_capacity: value
                .hub_inbox_capacity
                .unwrap_or(DEFAULT_HUB_INBOX_CAPACITY)
                .max(1),
            client_queue_capacity: value
                .client_queue_capacity
                .unwrap_or(DEFAULT_CLIENT_QUEUE_CAPACITY)
                .max(1),
            room_idle_timeout: Duration::from_secs(
                value
                    .room_idle_timeout_secs
                    .unwrap_or(DEFAULT_ROOM_IDLE_TIMEOUT_SECS),
            ),
            room_sweep_interval: Duration::from_secs(
                value
                    .room_sweep_interval_secs
                    .unwrap_or(DEFAULT_ROOM_SWEEP_INTERVAL_SECS)
                    .max(1),
            ),
            room_code_length: value
                .room_code_length
                .unwrap_or(DEFAULT_ROOM_CODE_LENGTH)
                .max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
