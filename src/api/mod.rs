//! External API for the `wasm32-unknown-unknown` target, used by the
//! JavaScript of the chat page.

mod event;
mod huddle;
mod huddle_error;
mod room_handle;

use wasm_bindgen::prelude::*;

use crate::proto;

pub use self::{
    huddle::Huddle, huddle_error::HuddleError, room_handle::RoomHandle,
};

/// Kind of a call exposed to JS side.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallType {
    /// Audio only call.
    Audio,

    /// Audio and video call.
    Video,
}

impl From<CallType> for proto::CallKind {
    #[inline]
    fn from(that: CallType) -> Self {
        match that {
            CallType::Audio => Self::Audio,
            CallType::Video => Self::Video,
        }
    }
}

impl From<proto::CallKind> for CallType {
    #[inline]
    fn from(that: proto::CallKind) -> Self {
        match that {
            proto::CallKind::Audio => Self::Audio,
            proto::CallKind::Video => Self::Video,
        }
    }
}
