/// Process-local room store.
pub mod memory;
/// Room store abstraction.
pub mod room_store;
