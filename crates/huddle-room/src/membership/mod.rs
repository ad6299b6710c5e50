//! Membership Manager: presence registration and the live member list.
//!
//! Joining is a single room transaction, so the capacity limit is exact.
//! Each client only ever rewrites its own member record; other records are
//! removed by the store on disconnect or by a closing vote.

mod manager;
mod types;


pub use manager::MembershipManager;
pub use types::{MemberSnapshot, RoomWatch};
