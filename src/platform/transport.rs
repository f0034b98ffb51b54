//! Signalling channel between a client and the room server.

use derive_more::Display;
use futures::stream::LocalBoxStream;
use huddle_client_api_proto::{ClientMsg, ServerMsg};
use tracerr::Traced;

use crate::{
    platform,
    rpc::CloseMsg,
    utils::{ErrorName, JsonParseError},
};

/// [`SignalingChannel`] states.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportState {
    /// Socket has been created. The connection is not open yet.
    ///
    /// Reflects `CONNECTING` state from JS side
    /// [`WebSocket.readyState`][1].
    ///
    /// [1]: https://developer.mozilla.org/docs/Web/API/WebSocket/readyState
    Connecting,

    /// The connection is open and ready to communicate.
    ///
    /// Reflects `OPEN` state from JS side [`WebSocket.readyState`][1].
    ///
    /// [1]: https://developer.mozilla.org/docs/Web/API/WebSocket/readyState
    Open,

    /// The connection is in the process of closing.
    ///
    /// Reflects `CLOSING` state from JS side [`WebSocket.readyState`][1].
    ///
    /// [1]: https://developer.mozilla.org/docs/Web/API/WebSocket/readyState
    Closing,

    /// The connection is closed or couldn't be opened.
    ///
    /// [`CloseMsg`] is the reason of why [`SignalingChannel`] went into
    /// this [`TransportState`].
    Closed(CloseMsg),
}

impl TransportState {
    /// Returns `true` if socket can be closed.
    #[must_use]
    pub fn can_close(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Bidirectional message channel to the room server.
///
/// Delivery order of [`ServerMsg`]s is the order the server relays them in,
/// nothing more is guaranteed.
#[cfg_attr(any(test, feature = "mockable"), mockall::automock)]
pub trait SignalingChannel {
    /// Returns [`LocalBoxStream`] of all messages received by this channel.
    fn on_message(&self) -> LocalBoxStream<'static, ServerMsg>;

    /// Sends given [`ClientMsg`] to the server.
    ///
    /// # Errors
    ///
    /// Errors if sending [`ClientMsg`] fails.
    fn send(&self, msg: &ClientMsg) -> Result<(), Traced<TransportError>>;

    /// Subscribes to [`TransportState`] changes of this channel.
    fn on_state_change(&self) -> LocalBoxStream<'static, TransportState>;
}

/// Errors that may occur when working with a [`SignalingChannel`].
#[derive(Clone, Debug, Display, PartialEq)]
pub enum TransportError {
    /// Occurs when the port to which the connection is being attempted
    /// is being blocked.
    #[display(fmt = "Failed to create WebSocket: {}", _0)]
    CreateSocket(platform::Error),

    /// Occurs when the connection close before becomes state active.
    #[display(fmt = "Failed to init WebSocket")]
    InitSocket,

    /// Occurs when the connection doesn't open in time.
    #[display(fmt = "WebSocket didn't open in time")]
    ConnectTimeout,

    /// Occurs when [`ClientMsg`] cannot be serialized.
    #[display(fmt = "Failed to parse client message: {}", _0)]
    ParseClientMessage(JsonParseError),

    /// Occurs when [`ServerMsg`] cannot be parsed.
    #[display(fmt = "Failed to parse server message: {}", _0)]
    ParseServerMessage(JsonParseError),

    /// Occurs if the received message is not a string.
    #[display(fmt = "Message is not a string")]
    MessageNotString,

    /// Occurs when a message cannot be send to server.
    #[display(fmt = "Failed to send message: {}", _0)]
    SendMessage(platform::Error),

    /// Occurs when handler failed to bind to some WebSocket event. Not
    /// really supposed to ever happen.
    #[display(fmt = "Failed to bind to WebSocket event: {}", _0)]
    EventBind(platform::Error),

    /// Occurs when message is sent to a closed socket.
    #[display(fmt = "Underlying socket is closed")]
    ClosedSocket,
}

impl ErrorName for TransportError {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateSocket(_) => "CreateSocket",
            Self::InitSocket => "InitSocket",
            Self::ConnectTimeout => "ConnectTimeout",
            Self::ParseClientMessage(_) => "ParseClientMessage",
            Self::ParseServerMessage(_) => "ParseServerMessage",
            Self::MessageNotString => "MessageNotString",
            Self::SendMessage(_) => "SendMessage",
            Self::EventBind(_) => "EventBind",
            Self::ClosedSocket => "ClosedSocket",
        }
    }
}
