use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the number of rooms currently held.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let rooms = state.store().room_count();
    debug!(rooms, "health check");
    HealthResponse::ok(rooms)
}
