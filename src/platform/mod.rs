//! Platform-specific functionality.
//!
//! The core only talks to a [`SignalingChannel`] and a [`MediaCapability`];
//! the browser implementations of both live in the `wasm32`-only submodule.

mod error;
pub mod media;
pub mod transport;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use self::wasm::{
    init_logger, set_panic_hook, spawn,
    media_devices::{BrowserMedia, BrowserTracks},
    peer_connection::RtcPeerConnection,
    transport::WebSocketChannel,
    utils::{EventListener, EventListenerBindError},
};

#[doc(inline)]
pub use self::{
    error::Error,
    media::{
        EngineEvent, EngineEvents, LocalTracks, MediaCapability, MediaError,
        NegotiationEngine, NegotiationError, PeerEvent,
    },
    transport::{SignalingChannel, TransportError, TransportState},
};

#[cfg(any(test, feature = "mockable"))]
pub use self::transport::MockSignalingChannel;
