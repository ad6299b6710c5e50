//! Config file values to room core settings.

use huddle_config::HuddleConfig;
use huddle_room::RoomSettings;

fn ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn room_settings(config: &HuddleConfig) -> RoomSettings {
    RoomSettings {
        max_members: config.room.max_members as usize,
        vote_duration_ms: ms(config.room.vote_duration_ms),
        global_vote_cooldown_ms: ms(config.room.global_vote_cooldown_ms),
        display_name_max_len: config.room.display_name_max_len as usize,
        reconcile_interval_ms: config.mesh.reconcile_interval_ms,
    }
}
