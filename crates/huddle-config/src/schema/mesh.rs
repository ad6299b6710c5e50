//! Peer mesh settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Periodic re-reconciliation interval, in milliseconds. Redials peers
    /// whose session dropped without a membership change.
    pub reconcile_interval_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 2_000,
        }
    }
}
