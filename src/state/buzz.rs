//! Latency-compensated buzz ordering.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// One entry of the buzz ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuzzRecord {
    /// Player that buzzed.
    pub id: String,
    /// Milliseconds since the round started, minus the player's latency.
    pub time: u64,
}

/// Reaction time of a buzz received at `now`, corrected by the player's measured latency.
///
/// Both terms are truncated to whole milliseconds before subtracting; the result never
/// goes below zero.
pub fn compensated_ms(round_start: Instant, now: Instant, latency: Duration) -> u64 {
    let elapsed = now.saturating_duration_since(round_start).as_millis();
    let compensated = elapsed.saturating_sub(latency.as_millis());
    u64::try_from(compensated).unwrap_or(u64::MAX)
}

/// Insert `record` before the first entry with a strictly greater time.
///
/// `buzzed` must already be sorted by time. Entries with an equal time keep their
/// arrival order.
pub fn insert_ordered(buzzed: &mut Vec<BuzzRecord>, record: BuzzRecord) {
    let position = buzzed.partition_point(|existing| existing.time <= record.time);
    buzzed.insert(position, record);
}
