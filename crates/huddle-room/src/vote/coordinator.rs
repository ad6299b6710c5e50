//! Vote state transitions against the shared store.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::RoomError;
use crate::protocol::{paths, RoomRecord, VoteOutcome, VoteRecord};
use crate::reconciler;
use crate::settings::RoomSettings;
use crate::store::SharedStore;
use crate::txn::{transact, Step};

use super::types::{PendingVote, VoteState};

/// Result of a `close_vote` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call committed the close.
    Committed(VoteOutcome),
    /// Someone else closed it first; carries their result.
    AlreadyClosed(Option<VoteOutcome>),
    /// The vote is still open.
    NotDue { end_time: i64 },
    /// A leftover ballot-only record was cleared without an outcome.
    Discarded,
}

impl CloseOutcome {
    pub fn outcome(&self) -> Option<&VoteOutcome> {
        match self {
            CloseOutcome::Committed(outcome) => Some(outcome),
            CloseOutcome::AlreadyClosed(outcome) => outcome.as_ref(),
            CloseOutcome::NotDue { .. } | CloseOutcome::Discarded => None,
        }
    }
}

/// Runs the vote state machine for any room.
pub struct VoteCoordinator {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    settings: RoomSettings,
}

impl VoteCoordinator {
    pub fn new(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>, settings: RoomSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Open a vote on behalf of `initiator_id`.
    ///
    /// Fails with `VoteInProgress`, `Cooldown`, `NotAMember`, or
    /// `AlreadyInitiated`, checked in that order against one snapshot.
    pub async fn start_vote(
        &self,
        room_key: &str,
        initiator_id: &str,
    ) -> Result<PendingVote, RoomError> {
        let now = self.clock.now_ms();
        let cooldown = self.settings.global_vote_cooldown_ms;
        let duration = self.settings.vote_duration_ms;

        let vote = transact(
            self.store.as_ref(),
            &paths::room(room_key),
            |room: &mut RoomRecord| {
                if VoteState::from_room(room).is_pending() {
                    return Err(RoomError::VoteInProgress);
                }
                let since_last = now - room.last_global_vote_end_time;
                if since_last < cooldown {
                    return Err(RoomError::Cooldown {
                        remaining_ms: cooldown - since_last,
                    });
                }
                let member = room
                    .members
                    .get_mut(initiator_id)
                    .ok_or_else(|| RoomError::NotAMember(initiator_id.to_string()))?;
                if member.has_initiated_vote {
                    return Err(RoomError::AlreadyInitiated);
                }
                member.has_initiated_vote = true;

                let record = VoteRecord {
                    initiator_id: initiator_id.to_string(),
                    end_time: now + duration,
                    ballots: Default::default(),
                };
                let pending = PendingVote::from_record(&record);
                room.vote = Some(record);
                room.last_global_vote_end_time = room.last_global_vote_end_time.max(now);
                Ok(Step::Write(pending))
            },
        )
        .await?;

        info!(
            room = room_key,
            participant = initiator_id,
            end_time = vote.end_time,
            "vote started"
        );
        Ok(vote)
    }

    /// Record `voter_id`'s ballot against `target_id`.
    ///
    /// Validation runs against a fresh read; the ballot itself is a plain
    /// write to the voter's own slot, so a repeated write is harmless.
    pub async fn cast_vote(
        &self,
        room_key: &str,
        voter_id: &str,
        target_id: &str,
    ) -> Result<(), RoomError> {
        let room = self.room(room_key).await?;
        let now = self.clock.now_ms();

        let vote = match VoteState::from_room(&room) {
            VoteState::Pending(vote) if !vote.is_expired(now) => vote,
            _ => return Err(RoomError::NoActiveVote),
        };
        if !room.members.contains_key(voter_id) {
            return Err(RoomError::NotAMember(voter_id.to_string()));
        }
        if target_id == voter_id {
            return Err(RoomError::InvalidTarget("cannot vote for yourself".into()));
        }
        if target_id == vote.initiator_id {
            return Err(RoomError::InvalidTarget(
                "cannot vote against the vote's initiator".into(),
            ));
        }
        if !room.members.contains_key(target_id) {
            return Err(RoomError::InvalidTarget(format!(
                "{target_id} is not in the room"
            )));
        }
        if vote.target_of(voter_id).is_some() {
            return Err(RoomError::AlreadyVoted);
        }

        self.store
            .write(&paths::ballot(room_key, target_id, voter_id), json!(true))
            .await?;
        info!(
            room = room_key,
            participant = voter_id,
            target = target_id,
            "ballot cast"
        );
        Ok(())
    }

    /// Close the pending vote if it has expired and apply its outcome.
    ///
    /// Safe to call from every client at once: exactly one caller gets
    /// `Committed`, the rest see `AlreadyClosed` with the same outcome.
    pub async fn close_vote(&self, room_key: &str) -> Result<CloseOutcome, RoomError> {
        let now = self.clock.now_ms();

        let result = transact(
            self.store.as_ref(),
            &paths::room(room_key),
            |room: &mut RoomRecord| {
                let Some(record) = room.vote.clone() else {
                    return Ok(Step::Keep(CloseOutcome::AlreadyClosed(
                        room.last_outcome.clone(),
                    )));
                };
                if record.is_orphaned() {
                    room.vote = None;
                    return Ok(Step::Write(CloseOutcome::Discarded));
                }
                if now <= record.end_time {
                    return Ok(Step::Keep(CloseOutcome::NotDue {
                        end_time: record.end_time,
                    }));
                }
                let pending = PendingVote::from_record(&record);
                let outcome = reconciler::apply_outcome(room, &pending, now);
                Ok(Step::Write(CloseOutcome::Committed(outcome)))
            },
        )
        .await?;

        match &result {
            CloseOutcome::Committed(outcome) => info!(
                room = room_key,
                target = outcome.target_id.as_deref().unwrap_or("-"),
                votes = outcome.votes,
                members = outcome.member_count,
                ejected = outcome.ejected,
                "vote closed"
            ),
            CloseOutcome::Discarded => debug!(room = room_key, "orphaned vote record cleared"),
            _ => debug!(room = room_key, ?result, "close_vote had nothing to do"),
        }
        Ok(result)
    }

    /// Current vote state of `room_key`.
    pub async fn vote_state(&self, room_key: &str) -> Result<VoteState, RoomError> {
        Ok(VoteState::from_room(&self.room(room_key).await?))
    }

    async fn room(&self, room_key: &str) -> Result<RoomRecord, RoomError> {
        let value = self.store.read(&paths::room(room_key)).await?;
        Ok(RoomRecord::from_value(value)?)
    }
}
