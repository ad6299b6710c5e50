//! Snapshot types handed out by the membership manager.

use std::collections::BTreeMap;

use tokio::sync::watch;

use crate::error::RoomError;
use crate::protocol::{MemberRecord, RoomRecord};
use crate::store::Value;

// ---------------------------------------------------------------------------
// Member snapshot
// ---------------------------------------------------------------------------

/// Full member mapping at one point in time, keyed by participant id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSnapshot(BTreeMap<String, MemberRecord>);

impl MemberSnapshot {
    pub fn new(members: BTreeMap<String, MemberRecord>) -> Self {
        Self(members)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.0.contains_key(participant_id)
    }

    pub fn get(&self, participant_id: &str) -> Option<&MemberRecord> {
        self.0.get(participant_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Participant ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemberRecord)> {
        self.0.iter().map(|(id, m)| (id.as_str(), m))
    }
}

impl From<&RoomRecord> for MemberSnapshot {
    fn from(room: &RoomRecord) -> Self {
        Self(room.members.clone())
    }
}

// ---------------------------------------------------------------------------
// Room watch
// ---------------------------------------------------------------------------

/// Live view of one room. Rapid store changes may collapse into a single
/// snapshot; every snapshot is complete.
#[derive(Debug)]
pub struct RoomWatch {
    room_key: String,
    rx: watch::Receiver<Option<Value>>,
}

impl RoomWatch {
    pub(crate) fn new(room_key: &str, rx: watch::Receiver<Option<Value>>) -> Self {
        Self {
            room_key: room_key.to_string(),
            rx,
        }
    }

    pub fn room_key(&self) -> &str {
        &self.room_key
    }

    /// Most recent snapshot.
    pub fn current(&self) -> Result<RoomRecord, RoomError> {
        Ok(RoomRecord::from_value(self.rx.borrow().clone())?)
    }

    pub fn members(&self) -> Result<MemberSnapshot, RoomError> {
        Ok(MemberSnapshot::from(&self.current()?))
    }

    /// Wait for the next snapshot. `None` once the store side is gone.
    pub async fn changed(&mut self) -> Option<Result<RoomRecord, RoomError>> {
        self.rx.changed().await.ok()?;
        let value = self.rx.borrow_and_update().clone();
        Some(RoomRecord::from_value(value).map_err(RoomError::from))
    }
}
