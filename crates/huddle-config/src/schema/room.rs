//! Room capacity and ejection-vote timing.

use serde::{Deserialize, Serialize};

/// Room coordination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Hard cap on present members per room.
    pub max_members: u32,
    /// How long a vote stays open, in milliseconds.
    pub vote_duration_ms: u64,
    /// Minimum time between two votes in the same room, in milliseconds.
    pub global_vote_cooldown_ms: u64,
    pub display_name_max_len: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_members: 5,
            vote_duration_ms: 30_000,
            global_vote_cooldown_ms: 60_000,
            display_name_max_len: 32,
        }
    }
}
