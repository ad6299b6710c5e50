use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::{RoomRecord, VoteRecord};

/// A vote that is open or waiting to be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    pub initiator_id: String,
    pub end_time: i64,
    /// Target id to the set of voters who chose it.
    pub ballots: BTreeMap<String, BTreeSet<String>>,
}

impl PendingVote {
    pub fn from_record(record: &VoteRecord) -> Self {
        let ballots = record
            .ballots
            .iter()
            .map(|(target, voters)| {
                let voters = voters
                    .iter()
                    .filter(|(_, cast)| **cast)
                    .map(|(voter, _)| voter.clone())
                    .collect::<BTreeSet<_>>();
                (target.clone(), voters)
            })
            .filter(|(_, voters)| !voters.is_empty())
            .collect();
        Self {
            initiator_id: record.initiator_id.clone(),
            end_time: record.end_time,
            ballots,
        }
    }

    /// The target `voter_id` chose, if any.
    pub fn target_of(&self, voter_id: &str) -> Option<&str> {
        self.ballots
            .iter()
            .find(|(_, voters)| voters.contains(voter_id))
            .map(|(target, _)| target.as_str())
    }

    /// Ballots are accepted until the clock passes `end_time`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.end_time
    }

    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.end_time - now_ms).max(0)
    }
}

/// Room-wide vote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteState {
    NoVote,
    Pending(PendingVote),
}

impl VoteState {
    /// An orphaned vote record counts as no vote.
    pub fn from_room(room: &RoomRecord) -> Self {
        match &room.vote {
            Some(record) if !record.is_orphaned() => {
                VoteState::Pending(PendingVote::from_record(record))
            }
            _ => VoteState::NoVote,
        }
    }

    pub fn pending(&self) -> Option<&PendingVote> {
        match self {
            VoteState::Pending(vote) => Some(vote),
            VoteState::NoVote => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending().is_some()
    }
}
