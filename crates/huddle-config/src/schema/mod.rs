//! Configuration schema types for Huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod mesh;
mod room;

pub use logging::*;
pub use mesh::*;
pub use room::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Huddle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub room: RoomConfig,
    pub mesh: MeshConfig,
    pub logging: LoggingConfig,
}
