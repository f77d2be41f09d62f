//! Membership differ: what changed on a batch roster between two snapshots.

use std::collections::BTreeSet;

use crate::batch::{BatchSnapshot, Roster};
use crate::types::UserId;

/// Mentor and participant changes between a previous and a next snapshot.
///
/// For each dimension an id is never in both the added and the removed set,
/// and an id active in both snapshots appears in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub removed_mentors: BTreeSet<UserId>,
    pub added_mentors: BTreeSet<UserId>,
    pub removed_participants: BTreeSet<UserId>,
    pub added_participants: BTreeSet<UserId>,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.removed_mentors.is_empty()
            && self.added_mentors.is_empty()
            && self.removed_participants.is_empty()
            && self.added_participants.is_empty()
    }

    /// Users who must receive a "removed" notification.
    pub fn removals(&self) -> Roster {
        Roster::new(
            self.removed_mentors.iter().cloned(),
            self.removed_participants.iter().cloned(),
        )
    }

    /// Users who must receive an "added" notification.
    pub fn additions(&self) -> Roster {
        Roster::new(
            self.added_mentors.iter().cloned(),
            self.added_participants.iter().cloned(),
        )
    }
}

/// Compute the membership delta between two snapshots.
///
/// Mentors are compared as plain sets. A participant counts as a member of a
/// snapshot only when its flag is `true`, so flipping `false -> true` is an
/// addition and `true -> false` (or dropping the entry) is a removal.
/// Neither snapshot is modified.
pub fn diff(previous: &BatchSnapshot, next: &BatchSnapshot) -> MembershipDelta {
    let prev_mentors: BTreeSet<&UserId> = previous.mentor_ids().iter().collect();
    let next_mentors: BTreeSet<&UserId> = next.mentor_ids().iter().collect();

    let prev_active: BTreeSet<UserId> = previous.active_participants().into_iter().collect();
    let next_active: BTreeSet<UserId> = next.active_participants().into_iter().collect();

    MembershipDelta {
        removed_mentors: prev_mentors
            .difference(&next_mentors)
            .map(|id| (*id).clone())
            .collect(),
        added_mentors: next_mentors
            .difference(&prev_mentors)
            .map(|id| (*id).clone())
            .collect(),
        removed_participants: prev_active.difference(&next_active).cloned().collect(),
        added_participants: next_active.difference(&prev_active).cloned().collect(),
    }
}
