use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::RoomError;
use crate::media::MediaStream;
use crate::membership::MemberSnapshot;
use crate::mesh::Direction;
use crate::protocol::{RoomRecord, VoteOutcome};
use crate::vote::PendingVote;

/// Events emitted by a [`RoomClient`](super::RoomClient).
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The member list differs from the last one reported.
    MembersChanged(MemberSnapshot),
    PeerConnected {
        peer_id: String,
        direction: Direction,
    },
    /// Remote audio became available.
    PeerStream {
        peer_id: String,
        stream: Arc<dyn MediaStream>,
    },
    PeerDisconnected {
        peer_id: String,
    },
    VoteStarted(PendingVote),
    VoteConcluded(VoteOutcome),
    /// The local participant was removed from the room. The client has
    /// already torn everything down.
    Ejected {
        outcome: Option<VoteOutcome>,
    },
    /// A background operation failed; the client keeps running.
    Error(String),
}

pub(super) enum Command {
    Leave {
        ack: oneshot::Sender<Result<(), RoomError>>,
    },
}

/// State shared between the client handle and its driver task.
#[derive(Debug, Default)]
pub(super) struct ClientState {
    pub room: RoomRecord,
    pub peers: Vec<String>,
    pub active: bool,
}
