use std::sync::Arc;

use crate::media::{MediaError, MediaSession, MediaStream};

/// Which side opened a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Live session to one remote member.
#[derive(Debug)]
pub struct Connection {
    pub remote_id: String,
    pub session: Arc<dyn MediaSession>,
    pub direction: Direction,
    /// Set once the remote side's audio arrives.
    pub remote_stream: Option<Arc<dyn MediaStream>>,
    /// Whether the remote has appeared in a membership snapshot since the
    /// session was opened. Unconfirmed inbound sessions survive teardown.
    pub confirmed: bool,
}

/// What one reconciliation pass changed.
#[derive(Debug, Default)]
pub struct MeshChanges {
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    pub failed: Vec<(String, MediaError)>,
}

impl MeshChanges {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty() && self.failed.is_empty()
    }
}

/// Result of handling an inbound session request.
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted,
    /// A session to this peer already exists; the request was rejected.
    Duplicate,
    /// An older inbound session from the same peer was replaced.
    Replaced,
    Failed(MediaError),
}
