/// Health check payload.
pub mod health;
/// Custom field validators.
pub mod validation;
/// WebSocket event envelopes.
pub mod ws;
