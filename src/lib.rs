//! Client library of Huddle chat rooms.
//!
//! A [`Room`] keeps a single signalling connection to the room server, which
//! carries the chat, the presence roster and the signalling of one-to-one
//! peer-to-peer calls. The call negotiation itself is delegated to a
//! [`MediaCapability`] (a browser's [RTCPeerConnection][1] and
//! [getUserMedia()][2] on `wasm32`).
//!
//! [`MediaCapability`]: platform::MediaCapability
//! [`Room`]: room::Room
//! [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
//! [2]: https://w3.org/TR/mediacapture-streams/#dom-mediadevices-getusermedia

#![forbid(non_ascii_idents, unsafe_code)]

#[cfg(target_arch = "wasm32")]
pub mod api;
pub mod call;
pub mod conf;
pub mod platform;
pub mod room;
pub mod rpc;
pub mod utils;

#[doc(inline)]
pub use huddle_client_api_proto as proto;

#[doc(inline)]
pub use self::{
    call::{CallError, CallId, CallStatus, Role},
    conf::CallSettings,
    room::{ChatMessage, EndReason, Room, RoomEvent, RoomHandle},
};
