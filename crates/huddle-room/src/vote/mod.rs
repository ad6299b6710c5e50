//! Vote Coordinator: open, tally, and close ejection votes.
//!
//! Starting and closing a vote are transactions over the whole room, so any
//! number of clients may race to close an expired vote and exactly one of
//! them commits. Ballots are plain writes to the voter's own slot.

mod coordinator;
pub mod tally;
mod types;


pub use coordinator::{CloseOutcome, VoteCoordinator};
pub use types::{PendingVote, VoteState};
