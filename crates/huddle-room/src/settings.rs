//! Runtime settings for the room core.

/// Room limits and timings. Built from the app config by the caller.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Maximum present members per room.
    pub max_members: usize,
    /// Vote length in milliseconds.
    pub vote_duration_ms: i64,
    /// Minimum gap between two votes in the same room, in milliseconds.
    pub global_vote_cooldown_ms: i64,
    pub display_name_max_len: usize,
    /// Periodic mesh re-reconciliation, in milliseconds.
    pub reconcile_interval_ms: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_members: 5,
            vote_duration_ms: 30_000,
            global_vote_cooldown_ms: 60_000,
            display_name_max_len: 32,
            reconcile_interval_ms: 2_000,
        }
    }
}
