//! Library crate for buzz-room-back, exposing modules for the binary and tests.

/// Runtime configuration.
pub mod config;
/// Room persistence.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Error types and the codes reported to clients.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Event handlers and background services.
pub mod services;
/// Rooms, hubs, game state and latency monitors.
pub mod state;
