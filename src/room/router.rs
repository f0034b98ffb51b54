//! Demultiplexing of [`ServerMsg`]s into chat, presence and call signalling.

use derive_more::Display;
use huddle_client_api_proto::{
    CallKind, IceCandidate, MessageId, Reactions, SdpType, ServerMsg,
    SessionDescription, UserId,
};

use super::ChatMessage;

/// Reason of ignoring a [`ServerMsg`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IgnoreReason {
    /// Signalling message is addressed to somebody else.
    #[display(fmt = "addressed to another participant")]
    NotAddressed,

    /// Offer arrived while a call or another offer is in progress.
    #[display(fmt = "busy with another call")]
    Busy,

    /// There is no call the message may belong to.
    #[display(fmt = "no call with the sender")]
    NoCall,

    /// Offer carries no valid offer description.
    #[display(fmt = "offer without offer description")]
    MissingOffer,

    /// Message `type` is unknown.
    #[display(fmt = "unknown message type")]
    UnknownType,
}

/// What a [`Room`] should do with a [`ServerMsg`].
///
/// [`Room`]: super::Room
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    /// Show a chat message.
    Chat(ChatMessage),

    /// Update reactions of a chat message.
    Reactions {
        /// Participant whose reaction caused the update.
        user: UserId,

        /// Message the reactions belong to.
        message_id: MessageId,

        /// Emoji that was added or removed.
        emoji: String,

        /// Everybody who currently reacts with `emoji`.
        users: Vec<UserId>,

        /// All reactions of the message.
        reactions: Reactions,
    },

    /// Replace the presence roster.
    Presence {
        /// Participant who joined, if any.
        joined: Option<UserId>,

        /// Participant who left, if any.
        left: Option<UserId>,

        /// The whole roster.
        online: Vec<UserId>,
    },

    /// Store the incoming offer until the user decides on it.
    IncomingOffer {
        /// Caller.
        from: UserId,

        /// Kind of the offered call.
        kind: CallKind,

        /// Caller's offer.
        offer: SessionDescription,
    },

    /// Hand the answer to the active call.
    Answer {
        /// Whether the callee accepted the call.
        accepted: bool,

        /// Callee's answer, if accepted.
        sdp: Option<SessionDescription>,
    },

    /// Hand the candidate to the active call.
    RemoteCandidate(IceCandidate),

    /// Buffer the candidate along with the pending offer.
    PendingCandidate(IceCandidate),

    /// The peer of the active call hung up.
    RemoteHangup,

    /// The pending offer was withdrawn by the caller.
    OfferWithdrawn,

    /// Drop the message.
    Ignore(IgnoreReason),
}

/// Read-only view of a [`Room`] deciding the [`Route`] of each [`ServerMsg`].
///
/// [`Room`]: super::Room
#[derive(Clone, Copy, Debug)]
pub struct MessageRouter<'a> {
    /// ID of the local participant.
    local: &'a UserId,

    /// Peer of the active call, if any.
    active_peer: Option<&'a UserId>,

    /// Sender of the pending offer, if any.
    pending_offerer: Option<&'a UserId>,
}

impl<'a> MessageRouter<'a> {
    /// Creates a new [`MessageRouter`] over the provided view.
    #[inline]
    #[must_use]
    pub fn new(
        local: &'a UserId,
        active_peer: Option<&'a UserId>,
        pending_offerer: Option<&'a UserId>,
    ) -> Self {
        Self {
            local,
            active_peer,
            pending_offerer,
        }
    }

    /// Decides what to do with the provided [`ServerMsg`].
    #[must_use]
    pub fn route(self, msg: ServerMsg) -> Route {
        use Route as R;

        match msg {
            ServerMsg::Message {
                user,
                content,
                message_id,
                timestamp,
                reactions,
            } => R::Chat(ChatMessage {
                user,
                content,
                message_id,
                timestamp,
                reactions,
            }),
            ServerMsg::Join { user, online } => R::Presence {
                joined: user,
                left: None,
                online,
            },
            ServerMsg::Leave { user, online } => R::Presence {
                joined: None,
                left: user,
                online,
            },
            ServerMsg::ReactionUpdate {
                user,
                message_id,
                emoji,
                users,
                reactions,
            } => R::Reactions {
                user,
                message_id,
                emoji,
                users,
                reactions,
            },
            ServerMsg::CallOffer {
                from_user,
                to_user,
                call_type,
                sdp,
            } => self.on_call_offer(from_user, &to_user, call_type, sdp),
            ServerMsg::CallAnswer {
                from_user,
                to_user,
                accepted,
                sdp,
            } => {
                if &to_user != self.local {
                    R::Ignore(IgnoreReason::NotAddressed)
                } else if self.active_peer == Some(&from_user) {
                    R::Answer { accepted, sdp }
                } else if !accepted && self.pending_offerer == Some(&from_user)
                {
                    R::OfferWithdrawn
                } else {
                    R::Ignore(IgnoreReason::NoCall)
                }
            }
            ServerMsg::IceCandidate {
                from_user,
                to_user,
                candidate,
            } => {
                if &to_user != self.local {
                    R::Ignore(IgnoreReason::NotAddressed)
                } else if self.active_peer == Some(&from_user) {
                    R::RemoteCandidate(candidate)
                } else if self.pending_offerer == Some(&from_user) {
                    R::PendingCandidate(candidate)
                } else {
                    R::Ignore(IgnoreReason::NoCall)
                }
            }
            ServerMsg::CallEnd { from_user, to_user } => {
                if &to_user != self.local {
                    R::Ignore(IgnoreReason::NotAddressed)
                } else if self.active_peer == Some(&from_user) {
                    R::RemoteHangup
                } else if self.pending_offerer == Some(&from_user) {
                    R::OfferWithdrawn
                } else {
                    R::Ignore(IgnoreReason::NoCall)
                }
            }
            ServerMsg::Unknown => R::Ignore(IgnoreReason::UnknownType),
        }
    }

    fn on_call_offer(
        self,
        from: UserId,
        to: &UserId,
        kind: CallKind,
        sdp: Option<SessionDescription>,
    ) -> Route {
        if to != self.local || &from == self.local {
            return Route::Ignore(IgnoreReason::NotAddressed);
        }
        if self.active_peer.is_some() || self.pending_offerer.is_some() {
            return Route::Ignore(IgnoreReason::Busy);
        }
        match sdp {
            Some(offer) if offer.kind == SdpType::Offer => {
                Route::IncomingOffer { from, kind, offer }
            }
            _ => Route::Ignore(IgnoreReason::MissingOffer),
        }
    }
}
