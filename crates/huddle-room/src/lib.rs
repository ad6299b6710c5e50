//! Room coordination core for Huddle voice rooms.
//!
//! A bounded set of participants joins a named room, forms a full mesh of
//! peer-to-peer audio sessions, and can vote to eject a disruptive member.
//! All cross-participant state lives in a [`SharedStore`] that only offers
//! primitive atomic operations; media transport sits behind
//! [`MediaSessionLayer`]. Both seams ship with in-process backends
//! ([`MemoryStore`], [`LoopbackNetwork`]) used by tests and the simulator.

pub mod client;
pub mod clock;
pub mod error;
pub mod media;
pub mod membership;
pub mod mesh;
pub mod protocol;
pub mod reconciler;
pub mod settings;
pub mod store;
pub mod vote;

mod txn;

pub use client::{RoomClient, RoomEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RoomError;
pub use media::{
    IncomingSession, LoopbackMedia, LoopbackNetwork, MediaError, MediaSession, MediaSessionLayer,
    MediaStream, SessionEvent,
};
pub use membership::{MemberSnapshot, MembershipManager, RoomWatch};
pub use mesh::{AcceptOutcome, Connection, Direction, MeshChanges, PeerMesh};
pub use protocol::{MemberRecord, RoomRecord, VoteOutcome, VoteRecord};
pub use reconciler::PresenceStatus;
pub use settings::RoomSettings;
pub use store::{MemoryConnection, MemoryStore, SharedStore, StoreError, TxDecision, TxResult};
pub use vote::{CloseOutcome, PendingVote, VoteCoordinator, VoteState};
