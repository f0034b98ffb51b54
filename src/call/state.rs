//! States of a [`CallSession`].
//!
//! [`CallSession`]: super::CallSession

use derive_more::Display;

/// Side of a call the local participant plays.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Role {
    /// Initiated the call and makes the offer.
    #[display(fmt = "caller")]
    Caller,

    /// Received the offer and answers it.
    #[display(fmt = "callee")]
    Callee,
}

/// Negotiation status of a call.
///
/// ```text
///  Idle ──> AwaitingMedia ──> OfferSent ──────────────> Connected
///                  │                                        ^
///                  └──────> OfferReceived ──> AnswerSent ───┘
/// ```
///
/// Every status may go to [`CallStatus::Ended`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum CallStatus {
    /// There is no call.
    Idle,

    /// Local media is being acquired.
    AwaitingMedia,

    /// Caller has sent its offer and waits for an answer.
    OfferSent,

    /// Callee has received the offer and negotiates the answer.
    OfferReceived,

    /// Callee has sent its answer.
    AnswerSent,

    /// Both descriptions are applied, media flows.
    Connected,

    /// Call is over and its media is released.
    Ended,
}

impl CallStatus {
    /// Indicates whether the remote peer already knows about a call in this
    /// status, so hanging it up must be signalled.
    ///
    /// A callee is known to the peer from the very start, since the call
    /// begins with the peer's offer.
    #[inline]
    #[must_use]
    pub fn is_known_to_peer(self, role: Role) -> bool {
        match role {
            Role::Caller => matches!(self, Self::OfferSent | Self::Connected),
            Role::Callee => !matches!(self, Self::Idle | Self::Ended),
        }
    }
}
