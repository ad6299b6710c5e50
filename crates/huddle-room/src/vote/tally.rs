//! Counting ballots and applying the quorum rule.

use std::collections::BTreeMap;

use super::types::PendingVote;

/// Result of counting one vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Target with strictly the most ballots. `None` on a tie or no ballots.
    pub target: Option<String>,
    /// Ballots for the leader, or the tied top count.
    pub votes: u32,
    /// Whether the leader reached quorum.
    pub ejects: bool,
}

/// Strict majority of the members present, not of ballots cast.
pub fn has_quorum(votes: u32, member_count: usize) -> bool {
    votes as usize * 2 > member_count
}

/// Ballot count per target.
///
/// A voter found under more than one target has spoiled their ballot and is
/// not counted anywhere. Ballots against the initiator are ignored.
pub fn count(vote: &PendingVote) -> BTreeMap<&str, u32> {
    let mut seen: BTreeMap<&str, u32> = BTreeMap::new();
    for voters in vote.ballots.values() {
        for voter in voters {
            *seen.entry(voter.as_str()).or_default() += 1;
        }
    }

    vote.ballots
        .iter()
        .filter(|(target, _)| **target != vote.initiator_id)
        .map(|(target, voters)| {
            let valid = voters
                .iter()
                .filter(|voter| seen.get(voter.as_str()) == Some(&1))
                .count() as u32;
            (target.as_str(), valid)
        })
        .filter(|(_, n)| *n > 0)
        .collect()
}

pub fn decide(vote: &PendingVote, member_count: usize) -> Decision {
    let counts = count(vote);
    let top = counts.values().copied().max().unwrap_or(0);
    let mut leaders = counts.iter().filter(|(_, n)| **n == top && top > 0);

    let target = match (leaders.next(), leaders.next()) {
        (Some((target, _)), None) => Some(target.to_string()),
        _ => None,
    };
    let ejects = target.is_some() && has_quorum(top, member_count);
    Decision {
        target,
        votes: top,
        ejects,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn vote(ballots: &[(&str, &[&str])]) -> PendingVote {
        PendingVote {
            initiator_id: "a".into(),
            end_time: 0,
            ballots: ballots
                .iter()
                .map(|(target, voters)| {
                    (
                        target.to_string(),
                        voters.iter().map(|v| v.to_string()).collect::<BTreeSet<_>>(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn quorum_is_strict() {
        assert!(!has_quorum(1, 3));
        assert!(has_quorum(2, 3));
        assert!(!has_quorum(2, 4));
        assert!(has_quorum(3, 4));
        assert!(!has_quorum(0, 0));
    }

    #[test]
    fn one_of_three_does_not_eject() {
        let d = decide(&vote(&[("b", &["c"])]), 3);
        assert_eq!(d.target.as_deref(), Some("b"));
        assert_eq!(d.votes, 1);
        assert!(!d.ejects);
    }

    #[test]
    fn two_of_four_does_not_eject() {
        let d = decide(&vote(&[("b", &["c", "d"])]), 4);
        assert_eq!(d.votes, 2);
        assert!(!d.ejects);
    }

    #[test]
    fn three_of_four_ejects() {
        let d = decide(&vote(&[("b", &["a", "c", "d"])]), 4);
        assert!(d.ejects);
        assert_eq!(d.target.as_deref(), Some("b"));
    }

    #[test]
    fn tie_has_no_target() {
        let d = decide(&vote(&[("b", &["c", "d"]), ("c", &["b", "e"])]), 5);
        assert_eq!(d.target, None);
        assert_eq!(d.votes, 2);
        assert!(!d.ejects);
    }

    #[test]
    fn no_ballots() {
        let d = decide(&vote(&[]), 3);
        assert_eq!(
            d,
            Decision {
                target: None,
                votes: 0,
                ejects: false
            }
        );
    }

    #[test]
    fn spoiled_and_initiator_ballots_are_ignored() {
        let v = vote(&[("a", &["b", "c"]), ("b", &["c", "d", "e"]), ("d", &["c"])]);
        let counts = count(&v);
        assert_eq!(counts.get("a"), None);
        assert_eq!(counts.get("b"), Some(&2));
        assert_eq!(counts.get("d"), None);
    }
}
