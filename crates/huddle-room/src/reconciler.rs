//! Presence/Ejection Reconciler.
//!
//! Applies a concluded vote to the room inside the closing transaction and
//! tells a client whether it is still present in a snapshot. Connections to
//! departed peers are torn down by the mesh, not here.

use crate::protocol::{RoomRecord, VoteOutcome};
use crate::vote::tally;
use crate::vote::PendingVote;

/// Apply `vote`'s result to `room` and clear the vote.
///
/// The quorum denominator is the member count of the same snapshot. If the
/// leader reached quorum and is still present, their record is removed and
/// the nomination count for their display name goes up by one.
/// `lastGlobalVoteEndTime` moves to `now` regardless of the result.
pub fn apply_outcome(room: &mut RoomRecord, vote: &PendingVote, now_ms: i64) -> VoteOutcome {
    let member_count = room.member_count();
    let decision = tally::decide(vote, member_count);

    let removed = match (&decision.target, decision.ejects) {
        (Some(target), true) => room.members.remove(target),
        _ => None,
    };
    if let Some(member) = &removed {
        *room.nominations.entry(member.name.clone()).or_insert(0) += 1;
    }

    room.vote = None;
    room.last_global_vote_end_time = room.last_global_vote_end_time.max(now_ms);

    let outcome = VoteOutcome {
        initiator_id: vote.initiator_id.clone(),
        target_id: decision.target,
        votes: decision.votes,
        member_count: member_count as u32,
        ejected: removed.is_some(),
        closed_at: now_ms,
    };
    room.last_outcome = Some(outcome.clone());
    outcome
}

/// Where the local participant stands in a room snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceStatus {
    /// Not yet visible; the join has not reached this snapshot.
    Joining,
    Present,
    /// Was present, now gone. Carries the vote that removed us, if any.
    Ejected { outcome: Option<VoteOutcome> },
}

impl PresenceStatus {
    /// Classify `room` for `local_id`. `seen_before` says whether an earlier
    /// snapshot contained the local participant.
    pub fn observe(local_id: &str, room: &RoomRecord, seen_before: bool) -> Self {
        if room.members.contains_key(local_id) {
            return PresenceStatus::Present;
        }
        if !seen_before {
            return PresenceStatus::Joining;
        }
        let outcome = room
            .last_outcome
            .as_ref()
            .filter(|o| o.ejected && o.target_id.as_deref() == Some(local_id))
            .cloned();
        PresenceStatus::Ejected { outcome }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::protocol::MemberRecord;

    fn room(ids: &[&str]) -> RoomRecord {
        let mut room = RoomRecord::default();
        for id in ids {
            room.members.insert(
                id.to_string(),
                MemberRecord {
                    name: format!("name-{id}"),
                    ..Default::default()
                },
            );
        }
        room
    }

    fn pending(target: &str, voters: &[&str]) -> PendingVote {
        let mut ballots = std::collections::BTreeMap::new();
        ballots.insert(
            target.to_string(),
            voters.iter().map(|v| v.to_string()).collect::<BTreeSet<_>>(),
        );
        PendingVote {
            initiator_id: "a".into(),
            end_time: 100,
            ballots,
        }
    }

    #[test]
    fn quorum_removes_target_and_counts_nomination() {
        let mut r = room(&["a", "b", "c"]);
        r.nominations.insert("name-b".into(), 1);
        let outcome = apply_outcome(&mut r, &pending("b", &["a", "c"]), 200);

        assert!(outcome.ejected);
        assert_eq!(outcome.member_count, 3);
        assert!(!r.members.contains_key("b"));
        assert_eq!(r.nominations["name-b"], 2);
        assert_eq!(r.last_outcome, Some(outcome));
        assert!(r.vote.is_none());
    }

    #[test]
    fn failed_vote_still_moves_cooldown() {
        let mut r = room(&["a", "b", "c"]);
        r.last_global_vote_end_time = 50;
        let outcome = apply_outcome(&mut r, &pending("b", &["c"]), 200);

        assert!(!outcome.ejected);
        assert!(r.members.contains_key("b"));
        assert_eq!(r.last_global_vote_end_time, 200);
        assert!(r.nominations.is_empty());
    }

    #[test]
    fn departed_target_is_not_ejected() {
        let mut r = room(&["a", "c", "d"]);
        let outcome = apply_outcome(&mut r, &pending("b", &["a", "c", "d"]), 200);
        assert_eq!(outcome.target_id.as_deref(), Some("b"));
        assert!(!outcome.ejected);
        assert_eq!(r.member_count(), 3);
    }

    #[test]
    fn presence_classification() {
        let mut r = room(&["a", "b", "c"]);
        assert_eq!(PresenceStatus::observe("a", &r, false), PresenceStatus::Present);
        assert_eq!(PresenceStatus::observe("z", &r, false), PresenceStatus::Joining);

        let outcome = apply_outcome(&mut r, &pending("b", &["a", "c"]), 10);
        assert_eq!(
            PresenceStatus::observe("b", &r, true),
            PresenceStatus::Ejected {
                outcome: Some(outcome)
            }
        );

        r.last_outcome = None;
        assert_eq!(
            PresenceStatus::observe("b", &r, true),
            PresenceStatus::Ejected { outcome: None }
        );
    }
}
