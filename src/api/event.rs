//! Conversion of [`RoomEvent`]s into plain JS objects.

use js_sys::Reflect;
use serde::Serialize;
use wasm_bindgen::JsValue;
use web_sys::MediaStreamTrack;

use crate::{
    proto::{CallKind, MessageId, Reactions, UserId},
    room::RoomEvent,
};

/// Shape of a [`RoomEvent`] handed to JS side, tagged with the `kind`
/// field.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EventView<'a> {
    ChatMessage {
        user: &'a UserId,
        content: &'a str,
        message_id: Option<&'a MessageId>,
        timestamp: Option<String>,
        reactions: &'a Reactions,
    },
    ReactionsUpdated {
        user: &'a UserId,
        message_id: &'a MessageId,
        emoji: &'a str,
        users: &'a [UserId],
        reactions: &'a Reactions,
    },
    PresenceChanged {
        joined: Option<&'a UserId>,
        left: Option<&'a UserId>,
        online: &'a [UserId],
    },
    IncomingCall {
        from: &'a UserId,
        call_type: CallKind,
    },
    IncomingCallWithdrawn {
        from: &'a UserId,
    },
    CallStatusChanged {
        peer: &'a UserId,
        status: String,
    },
    RemoteTrackAdded {
        peer: &'a UserId,
    },
    CallEnded {
        peer: &'a UserId,
        reason: String,
    },
    ConnectionClosed {
        reason: String,
    },
}

impl<'a> From<&'a RoomEvent<MediaStreamTrack>> for EventView<'a> {
    fn from(event: &'a RoomEvent<MediaStreamTrack>) -> Self {
        match event {
            RoomEvent::ChatMessage(msg) => Self::ChatMessage {
                user: &msg.user,
                content: &msg.content,
                message_id: msg.message_id.as_ref(),
                timestamp: msg
                    .timestamp
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
                reactions: &msg.reactions,
            },
            RoomEvent::ReactionsUpdated {
                user,
                message_id,
                emoji,
                users,
                reactions,
            } => Self::ReactionsUpdated {
                user,
                message_id,
                emoji,
                users,
                reactions,
            },
            RoomEvent::PresenceChanged {
                joined,
                left,
                online,
            } => Self::PresenceChanged {
                joined: joined.as_ref(),
                left: left.as_ref(),
                online,
            },
            RoomEvent::IncomingCall { from, kind } => Self::IncomingCall {
                from,
                call_type: *kind,
            },
            RoomEvent::IncomingCallWithdrawn { from } => {
                Self::IncomingCallWithdrawn { from }
            }
            RoomEvent::CallStatusChanged { peer, status } => {
                Self::CallStatusChanged {
                    peer,
                    status: status.to_string(),
                }
            }
            RoomEvent::RemoteTrackAdded { peer, .. } => {
                Self::RemoteTrackAdded { peer }
            }
            RoomEvent::CallEnded { peer, reason } => Self::CallEnded {
                peer,
                reason: reason.to_string(),
            },
            RoomEvent::ConnectionClosed(msg) => Self::ConnectionClosed {
                reason: msg.to_string(),
            },
        }
    }
}

/// Converts the provided [`RoomEvent`] into a JS object.
///
/// [`RoomEvent::RemoteTrackAdded`] carries its [`MediaStreamTrack`] in the
/// `track` field.
pub fn to_js(event: &RoomEvent<MediaStreamTrack>) -> Result<JsValue, JsValue> {
    let obj = JsValue::from_serde(&EventView::from(event))
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    if let RoomEvent::RemoteTrackAdded { track, .. } = event {
        Reflect::set(&obj, &JsValue::from_str("track"), track)?;
    }
    Ok(obj)
}
