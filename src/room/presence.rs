//! Roster of the participants currently in a room.

use std::collections::BTreeSet;

use huddle_client_api_proto::UserId;

/// Set of the participants currently in a room.
///
/// The server sends the whole roster on every join and leave, so the set is
/// only ever replaced as a whole.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PresenceSet(BTreeSet<UserId>);

impl PresenceSet {
    /// Replaces the whole roster with the provided one.
    pub fn replace<I: IntoIterator<Item = UserId>>(&mut self, online: I) {
        self.0 = online.into_iter().collect();
    }

    /// Indicates whether the provided participant is in the room.
    #[inline]
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    /// Returns count of the participants in the room.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Indicates whether nobody is in the room.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the participants in the room, sorted.
    #[must_use]
    pub fn to_vec(&self) -> Vec<UserId> {
        self.0.iter().cloned().collect()
    }
}
