//! Persisted room layout in the shared store.
//!
//! ```text
//! rooms/<roomKey>/
//!   members/<participantId>  { name, muted, hasInitiatedVote, nominationCount }
//!   vote                     { initiatorId, endTime, ballots: { target: { voter: true } } }
//!   lastGlobalVoteEndTime    number
//!   nominations/<identity>   number
//!   lastOutcome              { initiatorId, targetId, votes, memberCount, ejected, closedAt }
//! ```
//!
//! Absent fields deserialize to their defaults so a room that was never
//! written reads as an empty room.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, Value};

/// Root under which every room lives.
pub const ROOMS_ROOT: &str = "rooms";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One present participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemberRecord {
    pub name: String,
    pub muted: bool,
    pub has_initiated_vote: bool,
    /// Copied from the room's nomination table at join time.
    pub nomination_count: u32,
}

/// The pending vote as stored. `ballots[target][voter] == true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoteRecord {
    pub initiator_id: String,
    pub end_time: i64,
    pub ballots: BTreeMap<String, BTreeMap<String, bool>>,
}

impl VoteRecord {
    /// A ballot written after the vote was cleared leaves a record with no
    /// initiator behind.
    pub fn is_orphaned(&self) -> bool {
        self.initiator_id.is_empty()
    }
}

/// Result of a closed vote, kept so every client can react to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub initiator_id: String,
    /// Strict leader of the tally, if any.
    pub target_id: Option<String>,
    pub votes: u32,
    /// Quorum denominator: members present when the vote closed.
    pub member_count: u32,
    pub ejected: bool,
    pub closed_at: i64,
}

/// Whole room subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomRecord {
    pub members: BTreeMap<String, MemberRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteRecord>,
    pub last_global_vote_end_time: i64,
    pub nominations: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<VoteOutcome>,
}

impl RoomRecord {
    /// Parse a store snapshot; an absent room is an empty room.
    pub fn from_value(value: Option<Value>) -> Result<Self, StoreError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => {
                serde_json::from_value(v).map_err(|e| StoreError::Serialization(e.to_string()))
            }
        }
    }

    pub fn to_value(&self) -> Result<Value, StoreError> {
        serde_json::to_value(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Participant id of the present member using `name`, if any.
    pub fn member_by_name(&self, name: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(id, _)| id.as_str())
    }

    pub fn has_orphaned_vote(&self) -> bool {
        self.vote.as_ref().is_some_and(VoteRecord::is_orphaned)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Store paths for one room.
pub mod paths {
    use super::ROOMS_ROOT;

    pub fn room(room_key: &str) -> String {
        format!("{ROOMS_ROOT}/{room_key}")
    }

    pub fn members(room_key: &str) -> String {
        format!("{ROOMS_ROOT}/{room_key}/members")
    }

    pub fn member(room_key: &str, participant_id: &str) -> String {
        format!("{ROOMS_ROOT}/{room_key}/members/{participant_id}")
    }

    pub fn vote(room_key: &str) -> String {
        format!("{ROOMS_ROOT}/{room_key}/vote")
    }

    pub fn ballot(room_key: &str, target_id: &str, voter_id: &str) -> String {
        format!("{ROOMS_ROOT}/{room_key}/vote/ballots/{target_id}/{voter_id}")
    }
}

// ---------------------------------------------------------------------------
// Key validation
// ---------------------------------------------------------------------------

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Store keys may not contain path or query metacharacters.
        Regex::new(r"^[^/.#$\[\]\x00-\x1f]+$").unwrap_or_else(|_| unreachable!())
    })
}

/// Whether `key` can be used as a single store path segment.
pub fn is_valid_key(key: &str) -> bool {
    key_pattern().is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_room_is_empty() {
        let room = RoomRecord::from_value(None).unwrap();
        assert!(room.members.is_empty());
        assert!(room.vote.is_none());
        assert_eq!(room.last_global_vote_end_time, 0);
    }

    #[test]
    fn parses_camel_case_layout() {
        let room = RoomRecord::from_value(Some(json!({
            "members": {
                "p1": { "name": "ana", "muted": true, "hasInitiatedVote": true, "nominationCount": 2 }
            },
            "vote": {
                "initiatorId": "p1",
                "endTime": 5000,
                "ballots": { "p2": { "p3": true } }
            },
            "lastGlobalVoteEndTime": 1000
        })))
        .unwrap();

        let member = &room.members["p1"];
        assert_eq!(member.name, "ana");
        assert!(member.muted);
        assert!(member.has_initiated_vote);
        assert_eq!(member.nomination_count, 2);

        let vote = room.vote.unwrap();
        assert_eq!(vote.initiator_id, "p1");
        assert_eq!(vote.end_time, 5000);
        assert_eq!(vote.ballots["p2"]["p3"], true);
        assert_eq!(room.last_global_vote_end_time, 1000);
    }

    #[test]
    fn ballot_only_vote_is_orphaned() {
        let room = RoomRecord::from_value(Some(json!({
            "vote": { "ballots": { "p2": { "p3": true } } }
        })))
        .unwrap();
        assert!(room.has_orphaned_vote());
    }

    #[test]
    fn empty_vote_is_not_serialized() {
        let value = RoomRecord::default().to_value().unwrap();
        assert!(value.get("vote").is_none());
        assert!(value.get("lastOutcome").is_none());
    }

    #[test]
    fn rejects_malformed_room() {
        let err = RoomRecord::from_value(Some(json!({ "members": 7 }))).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn key_validation() {
        assert!(is_valid_key("ana"));
        assert!(is_valid_key("a2f1c0de-0000-4000-8000-000000000000"));
        assert!(is_valid_key("Zoë the great"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key("a.b"));
        assert!(!is_valid_key("#tag"));
        assert!(!is_valid_key("x[0]"));
    }

    #[test]
    fn paths_are_nested_under_room() {
        assert_eq!(paths::room("r1"), "rooms/r1");
        assert_eq!(paths::member("r1", "p1"), "rooms/r1/members/p1");
        assert_eq!(paths::ballot("r1", "t", "v"), "rooms/r1/vote/ballots/t/v");
    }
}
