//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Huddle Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[room]
# max_members = 5                 # 2-16
# vote_duration_ms = 30000        # 1000-600000
# global_vote_cooldown_ms = 60000 # 0-3600000
# display_name_max_len = 32       # 1-64

[mesh]
# reconcile_interval_ms = 2000    # 100-60000

[logging]
# level = "info"                  # trace, debug, info, warn, error
"##
    .to_string()
}
