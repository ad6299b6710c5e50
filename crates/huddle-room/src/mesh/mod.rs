//! Peer Mesh Orchestrator: one media session per pair of present members.
//!
//! Connections are local and never persisted. Only the participant with the
//! lexicographically smaller id dials; the other side accepts, so two
//! reconciling clients never race to dial each other.

mod orchestrator;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::PeerMesh;
pub use types::{AcceptOutcome, Connection, Direction, MeshChanges};
