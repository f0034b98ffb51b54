//! Chat and call signalling protocol of Huddle rooms.
//!
//! Every participant of a room holds a single WebSocket connection to the
//! room server. The same connection carries chat messages, presence
//! snapshots and the peer-to-peer call signalling, which the server relays
//! as is to the addressed participant.
//!
//! All messages are JSON objects tagged with a `type` field:
//! - [`ServerMsg`] is what the server delivers to a client;
//! - [`ClientMsg`] is what a client sends to the server.
//!
//! Session descriptions and ICE candidates are kept in the shapes browsers
//! produce with `RTCSessionDescription.toJSON()` and
//! `RTCIceCandidate.toJSON()`, so they may be handed to the remote browser
//! without any conversion.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::NaiveDateTime;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// ID of a `Room`.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct RoomId(pub String);

/// ID of a room participant.
///
/// The server identifies participants by the name they joined with, so this
/// is also the display name.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct UserId(pub String);

/// ID of a chat message, assigned by the server.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// Emoji reactions of a chat message: emoji to the users who reacted with
/// it.
pub type Reactions = HashMap<String, Vec<UserId>>;

/// Kind of a call, defining which local media is acquired for it.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Microphone only.
    #[display(fmt = "audio")]
    Audio,

    /// Microphone and camera.
    #[display(fmt = "video")]
    Video,
}

impl CallKind {
    /// Indicates whether this [`CallKind`] carries a track of the provided
    /// [`MediaKind`].
    #[inline]
    #[must_use]
    pub fn includes(self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => true,
            MediaKind::Video => self == Self::Video,
        }
    }
}

/// Kind of a single media track.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Representation of [RTCSdpType].
///
/// [RTCSdpType]: https://w3.org/TR/webrtc/#dom-rtcsdptype
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// [`offer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-offer
    #[display(fmt = "offer")]
    Offer,

    /// [`answer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-answer
    #[display(fmt = "answer")]
    Answer,
}

/// Represents [RTCSessionDescriptionInit][1] object.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcsessiondescriptioninit
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Whether this description is an offer or an answer.
    #[serde(rename = "type")]
    pub kind: SdpType,

    /// SDP body, opaque to the signalling.
    pub sdp: String,
}

impl SessionDescription {
    /// Creates a new [`SdpType::Offer`] description.
    #[inline]
    #[must_use]
    pub fn offer<S: Into<String>>(sdp: S) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Creates a new [`SdpType::Answer`] description.
    #[inline]
    #[must_use]
    pub fn answer<S: Into<String>>(sdp: S) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Represents [RTCIceCandidateInit][1] object.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcicecandidateinit
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_m_line_index: Option<u16>,
    pub sdp_mid: Option<String>,
}

/// Represents [RTCIceServer][1] (known as [ICE Server][2]) configuration
/// handed to the negotiation engine.
///
/// [1]: https://developer.mozilla.org/en-US/docs/Web/API/RTCIceServer
/// [2]: https://webrtcglossary.com/ice#ice-server
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Message delivered by the room server to a client.
///
/// Unknown `type`s are parsed as [`ServerMsg::Unknown`], so newer servers do
/// not break older clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Chat message posted to the room.
    Message {
        /// Author of the message.
        user: UserId,

        /// Text of the message.
        content: String,

        /// ID assigned to the message by the server.
        #[serde(default)]
        message_id: Option<MessageId>,

        /// Server time the message was accepted at.
        #[serde(default)]
        timestamp: Option<NaiveDateTime>,

        /// Reactions the message has collected so far.
        #[serde(default)]
        reactions: Reactions,
    },

    /// Somebody joined the room.
    Join {
        /// Participant who joined.
        #[serde(default)]
        user: Option<UserId>,

        /// Full roster of the room after the join.
        online: Vec<UserId>,
    },

    /// Somebody left the room.
    Leave {
        /// Participant who left.
        #[serde(default)]
        user: Option<UserId>,

        /// Full roster of the room after the leave.
        online: Vec<UserId>,
    },

    /// Reactions of a chat message have changed.
    ReactionUpdate {
        /// Participant whose reaction caused this update.
        user: UserId,

        /// Message the reactions belong to.
        message_id: MessageId,

        /// Emoji that was added or removed.
        emoji: String,

        /// Everybody who currently reacts with `emoji`.
        #[serde(default)]
        users: Vec<UserId>,

        /// All reactions of the message.
        #[serde(default)]
        reactions: Reactions,
    },

    /// `from_user` wants to call `to_user`.
    CallOffer {
        from_user: UserId,
        to_user: UserId,
        call_type: CallKind,
        #[serde(default)]
        sdp: Option<SessionDescription>,
    },

    /// `from_user` accepted or rejected the call offered by `to_user`.
    CallAnswer {
        from_user: UserId,
        to_user: UserId,
        accepted: bool,
        #[serde(default)]
        sdp: Option<SessionDescription>,
    },

    /// `from_user` discovered a new ICE candidate for its call with
    /// `to_user`.
    IceCandidate {
        from_user: UserId,
        to_user: UserId,
        candidate: IceCandidate,
    },

    /// `from_user` hung up or withdrew its offer to `to_user`.
    ///
    /// Not every room server relays it, so clients hang up with a rejecting
    /// [`ServerMsg::CallAnswer`] instead and only understand this one.
    CallEnd { from_user: UserId, to_user: UserId },

    /// Message of a `type` this client doesn't know about.
    #[serde(other)]
    Unknown,
}

/// Message sent by a client to the room server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Posts a chat message. The author is implied by the connection.
    Message { content: String },

    /// Reacts to a chat message with an emoji.
    AddReaction { message_id: MessageId, emoji: String },

    /// Withdraws a reaction from a chat message.
    RemoveReaction { message_id: MessageId, emoji: String },

    /// Offers a call to `to_user`.
    CallOffer {
        from_user: UserId,
        to_user: UserId,
        call_type: CallKind,
        sdp: SessionDescription,
    },

    /// Answers a call offered by `to_user`.
    ///
    /// `sdp` is present only if `accepted` is `true`.
    CallAnswer {
        from_user: UserId,
        to_user: UserId,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<SessionDescription>,
    },

    /// Hands a locally discovered ICE candidate to `to_user`.
    IceCandidate {
        from_user: UserId,
        to_user: UserId,
        candidate: IceCandidate,
    },
}

impl ClientMsg {
    /// Returns [`ClientMsg::CallAnswer`] accepting the call of `to_user`.
    #[must_use]
    pub fn accept_call(
        from_user: UserId,
        to_user: UserId,
        sdp: SessionDescription,
    ) -> Self {
        Self::CallAnswer {
            from_user,
            to_user,
            accepted: true,
            sdp: Some(sdp),
        }
    }

    /// Returns [`ClientMsg::CallAnswer`] declining the call with `to_user`.
    ///
    /// Rejects an offer and hangs up an established call alike.
    #[must_use]
    pub fn reject_call(from_user: UserId, to_user: UserId) -> Self {
        Self::CallAnswer {
            from_user,
            to_user,
            accepted: false,
            sdp: None,
        }
    }
}
