//! Membership manager: join, leave, mute, and room subscriptions.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::RoomError;
use crate::protocol::{is_valid_key, paths, MemberRecord, RoomRecord};
use crate::settings::RoomSettings;
use crate::store::{SharedStore, StoreError};
use crate::txn::{transact, Step};

use super::types::RoomWatch;

/// Presence operations for one local participant.
pub struct MembershipManager {
    store: Arc<dyn SharedStore>,
    local_id: String,
    settings: RoomSettings,
}

impl MembershipManager {
    /// `local_id` is the participant id assigned by the media layer.
    pub fn new(store: Arc<dyn SharedStore>, local_id: &str, settings: RoomSettings) -> Self {
        Self {
            store,
            local_id: local_id.to_string(),
            settings,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Check a display name before it is used as a nomination key.
    pub fn validate_display_name(&self, name: &str) -> Result<(), RoomError> {
        if name.trim().is_empty() {
            return Err(RoomError::InvalidDisplayName("name is empty".into()));
        }
        if name.trim() != name {
            return Err(RoomError::InvalidDisplayName(format!(
                "{name:?} has leading or trailing whitespace"
            )));
        }
        let len = name.chars().count();
        if len > self.settings.display_name_max_len {
            return Err(RoomError::InvalidDisplayName(format!(
                "name is {len} characters, limit is {}",
                self.settings.display_name_max_len
            )));
        }
        if !is_valid_key(name) {
            return Err(RoomError::InvalidDisplayName(format!(
                "{name:?} contains a reserved character"
            )));
        }
        Ok(())
    }

    /// Register the local participant in `room_key`.
    ///
    /// Capacity is checked inside the same transaction that inserts the
    /// member, and every existing member's `hasInitiatedVote` is cleared
    /// because the room grew. Display names are unique among present
    /// members since nomination counts are keyed by name. Joining a room
    /// the local participant is already in is a no-op.
    pub async fn join(&self, room_key: &str, display_name: &str) -> Result<String, RoomError> {
        check_room_key(room_key)?;
        self.validate_display_name(display_name)?;

        let max = self.settings.max_members;
        let local_id = self.local_id.as_str();

        let members = transact(
            self.store.as_ref(),
            &paths::room(room_key),
            |room: &mut RoomRecord| {
                if room.members.contains_key(local_id) {
                    return Ok(Step::Keep(room.member_count()));
                }
                if room.member_count() >= max {
                    return Err(RoomError::CapacityExceeded { max });
                }
                if room.member_by_name(display_name).is_some() {
                    return Err(RoomError::NameTaken(display_name.to_string()));
                }
                for member in room.members.values_mut() {
                    member.has_initiated_vote = false;
                }
                let nomination_count = room.nominations.get(display_name).copied().unwrap_or(0);
                room.members.insert(
                    local_id.to_string(),
                    MemberRecord {
                        name: display_name.to_string(),
                        muted: false,
                        has_initiated_vote: false,
                        nomination_count,
                    },
                );
                Ok(Step::Write(room.member_count()))
            },
        )
        .await?;

        self.store
            .remove_on_disconnect(&paths::member(room_key, local_id))
            .await?;

        info!(
            room = room_key,
            participant = local_id,
            name = display_name,
            members,
            "joined room"
        );
        Ok(self.local_id.clone())
    }

    /// Watch the whole room subtree.
    pub async fn subscribe(&self, room_key: &str) -> Result<RoomWatch, RoomError> {
        check_room_key(room_key)?;
        let rx = self.store.subscribe(&paths::room(room_key)).await?;
        debug!(room = room_key, "subscribed to room");
        Ok(RoomWatch::new(room_key, rx))
    }

    /// Remove the local participant's record. Removing an absent member
    /// succeeds. Other members are only removed by a vote outcome or by
    /// their own disconnect.
    pub async fn leave(&self, room_key: &str, participant_id: &str) -> Result<(), RoomError> {
        if participant_id != self.local_id {
            return Err(RoomError::NotOwnRecord);
        }
        check_room_key(room_key)?;
        self.store
            .delete(&paths::member(room_key, participant_id))
            .await?;
        info!(room = room_key, participant = participant_id, "left room");
        Ok(())
    }

    /// Update the `muted` flag on the local participant's own record.
    pub async fn set_own_muted(
        &self,
        room_key: &str,
        participant_id: &str,
        muted: bool,
    ) -> Result<(), RoomError> {
        if participant_id != self.local_id {
            return Err(RoomError::NotOwnRecord);
        }
        check_room_key(room_key)?;

        transact(
            self.store.as_ref(),
            &paths::member(room_key, participant_id),
            |member: &mut Option<MemberRecord>| match member {
                None => Err(RoomError::NotAMember(participant_id.to_string())),
                Some(m) if m.muted == muted => Ok(Step::Keep(())),
                Some(m) => {
                    m.muted = muted;
                    Ok(Step::Write(()))
                }
            },
        )
        .await?;

        debug!(room = room_key, participant = participant_id, muted, "mute updated");
        Ok(())
    }

    /// One-off read of the room.
    pub async fn snapshot(&self, room_key: &str) -> Result<RoomRecord, RoomError> {
        check_room_key(room_key)?;
        let value = self.store.read(&paths::room(room_key)).await?;
        Ok(RoomRecord::from_value(value)?)
    }
}

fn check_room_key(room_key: &str) -> Result<(), RoomError> {
    if is_valid_key(room_key) {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(format!("room key {room_key:?}")).into())
    }
}
