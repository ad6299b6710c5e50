//! Full configuration validation.
//!
//! Validates all numeric ranges and collects errors into a single
//! `ConfigError`.

mod helpers;


use crate::schema::HuddleConfig;
use huddle_common::ConfigError;

use helpers::{validate_range, validate_range_u64};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &HuddleConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_range(&mut errors, "room.max_members", config.room.max_members, 2, 16);
    validate_range_u64(
        &mut errors,
        "room.vote_duration_ms",
        config.room.vote_duration_ms,
        1_000,
        600_000,
    );
    validate_range_u64(
        &mut errors,
        "room.global_vote_cooldown_ms",
        config.room.global_vote_cooldown_ms,
        0,
        3_600_000,
    );
    validate_range(
        &mut errors,
        "room.display_name_max_len",
        config.room.display_name_max_len,
        1,
        64,
    );

    validate_range_u64(
        &mut errors,
        "mesh.reconcile_interval_ms",
        config.mesh.reconcile_interval_ms,
        100,
        60_000,
    );

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(format!(
            "logging.level = {:?} is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
