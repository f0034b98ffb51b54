//! [WebSocket] signalling channel.
//!
//! [WebSocket]: https://developer.mozilla.org/docs/Web/API/WebSocket

use std::{cell::RefCell, rc::Rc, time::Duration};

use futures::{
    channel::mpsc,
    future::{self, Either},
    stream::LocalBoxStream,
    StreamExt as _,
};
use huddle_client_api_proto::{ClientMsg, ServerMsg};
use tracerr::Traced;
use url::Url;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket as SysWebSocket};

use crate::{
    platform::{
        transport::{SignalingChannel, TransportError, TransportState},
        wasm::{
            delay_for,
            utils::{EventListener, EventListenerBindError},
        },
    },
    rpc::CloseMsg,
};

type Result<T, E = Traced<TransportError>> = std::result::Result<T, E>;

impl From<EventListenerBindError> for TransportError {
    #[inline]
    fn from(err: EventListenerBindError) -> Self {
        Self::EventBind(err.into())
    }
}

/// Parses a [`ServerMsg`] out of a [MessageEvent][1].
///
/// [1]: https://developer.mozilla.org/en-US/docs/Web/API/MessageEvent
fn parse_message(msg: &MessageEvent) -> Result<ServerMsg, TransportError> {
    let payload = msg
        .data()
        .as_string()
        .ok_or(TransportError::MessageNotString)?;

    serde_json::from_str(&payload)
        .map_err(|e| TransportError::ParseServerMessage(e.into()))
}

struct InnerSocket {
    /// JS side [WebSocket].
    ///
    /// [WebSocket]: https://developer.mozilla.org/docs/Web/API/WebSocket
    socket: Rc<SysWebSocket>,

    /// State of the connection.
    state: TransportState,

    /// Listener of the [open event][1].
    ///
    /// [1]: https://developer.mozilla.org/en-US/Web/API/WebSocket/open_event
    on_open_listener: Option<EventListener<SysWebSocket, Event>>,

    /// Listener of the [message event][1].
    ///
    /// [1]: https://developer.mozilla.org/docs/Web/API/WebSocket/message_event
    on_message_listener: Option<EventListener<SysWebSocket, MessageEvent>>,

    /// Listener of the [close event][1].
    ///
    /// [1]: https://developer.mozilla.org/docs/Web/API/WebSocket/close_event
    on_close_listener: Option<EventListener<SysWebSocket, CloseEvent>>,

    /// Subscribers of [`SignalingChannel::on_message()`].
    on_message_subs: Vec<mpsc::UnboundedSender<ServerMsg>>,

    /// Subscribers of [`SignalingChannel::on_state_change()`].
    on_state_subs: Vec<mpsc::UnboundedSender<TransportState>>,
}

impl InnerSocket {
    fn new(url: &Url) -> Result<Self> {
        let socket = SysWebSocket::new(url.as_str())
            .map_err(Into::into)
            .map_err(TransportError::CreateSocket)
            .map_err(tracerr::wrap!())?;
        Ok(Self {
            socket: Rc::new(socket),
            state: TransportState::Connecting,
            on_open_listener: None,
            on_message_listener: None,
            on_close_listener: None,
            on_message_subs: Vec::new(),
            on_state_subs: Vec::new(),
        })
    }

    fn set_state(&mut self, state: TransportState) {
        log::debug!("WebSocket state: {:?}", state);
        self.state = state.clone();
        self.on_state_subs
            .retain(|sub| sub.unbounded_send(state.clone()).is_ok());
    }
}

impl Drop for InnerSocket {
    fn drop(&mut self) {
        if self.state.can_close() {
            if let Err(e) =
                self.socket.close_with_code_and_reason(1000, "leave")
            {
                log::error!(
                    "Failed to normally close socket: {}",
                    crate::platform::Error::from(e),
                );
            }
        }
    }
}

/// [`SignalingChannel`] over a browser [WebSocket].
///
/// # Drop
///
/// The listeners hold references to the socket, which are freed in the
/// [`Drop`] implementation.
///
/// [WebSocket]: https://developer.mozilla.org/docs/Web/API/WebSocket
pub struct WebSocketChannel(Rc<RefCell<InnerSocket>>);

impl WebSocketChannel {
    /// Opens a new WebSocket connection to the provided `url`, resolving once
    /// it is open.
    ///
    /// # Errors
    ///
    /// - [`TransportError::CreateSocket`] if the browser refuses the `url`;
    /// - [`TransportError::EventBind`] if the socket events cannot be bound;
    /// - [`TransportError::InitSocket`] if the socket is closed before
    ///   opening;
    /// - [`TransportError::ConnectTimeout`] if the socket doesn't open
    ///   within the `timeout`.
    pub async fn connect(url: &Url, timeout: Duration) -> Result<Self> {
        let socket = Rc::new(RefCell::new(InnerSocket::new(url)?));
        let (state_tx, mut state_rx) = mpsc::unbounded();
        {
            let mut socket_mut = socket.borrow_mut();
            socket_mut.on_state_subs.push(state_tx);

            let inner = Rc::clone(&socket);
            socket_mut.on_close_listener = Some(
                EventListener::new_once(
                    Rc::clone(&socket_mut.socket),
                    "close",
                    move |msg: CloseEvent| {
                        inner.borrow_mut().set_state(TransportState::Closed(
                            CloseMsg::new(msg.code(), msg.reason()),
                        ));
                    },
                )
                .map_err(tracerr::map_from_and_wrap!(=> TransportError))?,
            );

            let inner = Rc::clone(&socket);
            socket_mut.on_open_listener = Some(
                EventListener::new_once(
                    Rc::clone(&socket_mut.socket),
                    "open",
                    move |_| {
                        inner.borrow_mut().set_state(TransportState::Open);
                    },
                )
                .map_err(tracerr::map_from_and_wrap!(=> TransportError))?,
            );
        }
        let this = Self(socket);

        let opened =
            future::select(state_rx.next(), Box::pin(delay_for(timeout)))
                .await;
        match opened {
            Either::Left((Some(TransportState::Open), _)) => {
                this.set_on_close_listener()?;
                this.set_on_message_listener()?;
                Ok(this)
            }
            Either::Left(_) => Err(tracerr::new!(TransportError::InitSocket)),
            Either::Right(_) => {
                log::warn!("WebSocket {} didn't open in {:?}", url, timeout);
                Err(tracerr::new!(TransportError::ConnectTimeout))
            }
        }
    }

    /// Rebinds the close listener, so it moves the channel to
    /// [`TransportState::Closed`].
    fn set_on_close_listener(&self) -> Result<()> {
        let this = Rc::clone(&self.0);
        let on_close = EventListener::new_once(
            Rc::clone(&self.0.borrow().socket),
            "close",
            move |msg: CloseEvent| {
                this.borrow_mut().set_state(TransportState::Closed(
                    CloseMsg::new(msg.code(), msg.reason()),
                ));
            },
        )
        .map_err(tracerr::map_from_and_wrap!(=> TransportError))?;
        self.0.borrow_mut().on_close_listener = Some(on_close);
        Ok(())
    }

    /// Binds the message listener, forwarding the parsed [`ServerMsg`]s to
    /// the subscribers.
    fn set_on_message_listener(&self) -> Result<()> {
        let this = Rc::clone(&self.0);
        let on_message = EventListener::new_mut(
            Rc::clone(&self.0.borrow().socket),
            "message",
            move |msg: MessageEvent| {
                let msg = match parse_message(&msg) {
                    Ok(msg) => msg,
                    Err(e) => {
                        log::warn!("Dropping server message: {}", e);
                        return;
                    }
                };

                this.borrow_mut()
                    .on_message_subs
                    .retain(|sub| sub.unbounded_send(msg.clone()).is_ok());
            },
        )
        .map_err(tracerr::map_from_and_wrap!(=> TransportError))?;
        self.0.borrow_mut().on_message_listener = Some(on_message);
        Ok(())
    }
}

impl SignalingChannel for WebSocketChannel {
    fn on_message(&self) -> LocalBoxStream<'static, ServerMsg> {
        let (tx, rx) = mpsc::unbounded();
        self.0.borrow_mut().on_message_subs.push(tx);

        Box::pin(rx)
    }

    fn send(&self, msg: &ClientMsg) -> Result<()> {
        let inner = self.0.borrow();
        let message = serde_json::to_string(msg)
            .map_err(|e| TransportError::ParseClientMessage(e.into()))
            .map_err(tracerr::wrap!())?;

        match inner.state {
            TransportState::Open => inner
                .socket
                .send_with_str(&message)
                .map_err(Into::into)
                .map_err(TransportError::SendMessage)
                .map_err(tracerr::wrap!()),
            _ => Err(tracerr::new!(TransportError::ClosedSocket)),
        }
    }

    fn on_state_change(&self) -> LocalBoxStream<'static, TransportState> {
        let (tx, rx) = mpsc::unbounded();
        self.0.borrow_mut().on_state_subs.push(tx);

        Box::pin(rx)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        let mut inner = self.0.borrow_mut();
        inner.on_open_listener.take();
        inner.on_message_listener.take();
        inner.on_close_listener.take();
    }
}
