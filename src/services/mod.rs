/// Buzzer registration, buzzing, clearing and bulk state updates.
pub mod buzzer_service;
/// Maps inbound actions onto their handlers.
pub mod event_router;
/// Health check service.
pub mod health_service;
/// Hosting, joining, reconnecting and leaving rooms.
pub mod lobby_service;
/// Background eviction of idle rooms.
pub mod room_sweeper;
/// WebSocket connection and message handling service.
pub mod websocket_service;
