//! Room of the chat: its roster, chat messages and the one-to-one call of
//! the local participant.

pub mod presence;
pub mod router;

use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::{Rc, Weak},
};

use chrono::NaiveDateTime;
use derive_more::Display;
use futures::{
    channel::{mpsc, oneshot},
    future::{self, LocalBoxFuture},
    stream::{LocalBoxStream, StreamExt as _},
};
use huddle_client_api_proto::{
    CallKind, ClientMsg, IceCandidate, MediaKind, MessageId, Reactions,
    ServerMsg, SessionDescription, UserId,
};
use tracerr::Traced;

use crate::{
    call::{
        AnswerOutcome, CallError, CallId, CallSession, CallStatus,
        CandidateQueue, Role,
    },
    conf::CallSettings,
    platform::{
        EngineEvent, EngineEvents, MediaCapability, PeerEvent,
        SignalingChannel, TransportState,
    },
    rpc::CloseMsg,
};

#[doc(inline)]
pub use self::{
    presence::PresenceSet,
    router::{IgnoreReason, MessageRouter, Route},
};

/// Chat message posted to a room.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    /// Author of the message.
    pub user: UserId,

    /// Text of the message.
    pub content: String,

    /// ID assigned to the message by the server.
    pub message_id: Option<MessageId>,

    /// Server time the message was accepted at.
    pub timestamp: Option<NaiveDateTime>,

    /// Reactions the message has collected so far.
    pub reactions: Reactions,
}

/// Reason of a call ending.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum EndReason {
    /// The local participant hung up.
    #[display(fmt = "hung up")]
    Local,

    /// The callee rejected the call.
    #[display(fmt = "rejected")]
    Rejected,

    /// The peer hung up.
    #[display(fmt = "peer hung up")]
    RemoteHangup,

    /// The peer left the room.
    #[display(fmt = "peer left")]
    PeerLeft,

    /// The signalling channel was closed.
    #[display(fmt = "connection closed")]
    ChannelClosed,

    /// The call failed.
    #[display(fmt = "failed: {}", _0)]
    Failed(CallError),
}

/// Event of a [`Room`] for the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum RoomEvent<T> {
    /// Chat message was posted.
    ChatMessage(ChatMessage),

    /// Reactions of a chat message have changed.
    ReactionsUpdated {
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

    /// Roster of the room has changed.
    PresenceChanged {
        /// Participant who joined, if any.
        joined: Option<UserId>,

        /// Participant who left, if any.
        left: Option<UserId>,

        /// The whole roster.
        online: Vec<UserId>,
    },

    /// Somebody calls the local participant.
    IncomingCall {
        /// Caller.
        from: UserId,

        /// Kind of the offered call.
        kind: CallKind,
    },

    /// The incoming call is gone before it was answered.
    IncomingCallWithdrawn {
        /// Caller.
        from: UserId,
    },

    /// Status of the call has changed.
    CallStatusChanged {
        /// Peer of the call.
        peer: UserId,

        /// New status.
        status: CallStatus,
    },

    /// Track of the peer has arrived.
    RemoteTrackAdded {
        /// Peer of the call.
        peer: UserId,

        /// The track.
        track: T,
    },

    /// The call is over and its media is released.
    CallEnded {
        /// Peer of the call.
        peer: UserId,

        /// Why the call ended.
        reason: EndReason,
    },

    /// The signalling channel was closed.
    ConnectionClosed(CloseMsg),
}

/// Incoming offer awaiting the user's decision.
#[derive(Debug)]
struct PendingOffer {
    /// Caller.
    from: UserId,

    /// Kind of the offered call.
    kind: CallKind,

    /// Caller's offer.
    offer: SessionDescription,

    /// Caller's candidates which arrived before the decision.
    candidates: CandidateQueue,
}

/// Action performed on the [`Room`] within its event loop.
type Task<M> =
    Box<dyn FnOnce(Rc<InnerRoom<M>>) -> LocalBoxFuture<'static, ()>>;

type EventSender<T> = mpsc::UnboundedSender<RoomEvent<T>>;

/// Receivers consumed by [`Room::run()`].
struct LoopInputs<M: MediaCapability> {
    tasks: mpsc::UnboundedReceiver<Task<M>>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent<M::RemoteTrack>>,
}

/// Room of the chat joined by the local participant.
///
/// Inbound messages, engine events and the queued user actions are handled
/// one at a time by the future returned from [`Room::run()`], which must be
/// spawned on a local executor.
///
/// Dropping the [`Room`] hangs up its call.
pub struct Room<M: MediaCapability> {
    inner: Rc<InnerRoom<M>>,
    tasks: mpsc::UnboundedSender<Task<M>>,
    inputs: RefCell<Option<LoopInputs<M>>>,
}

impl<M: MediaCapability> Room<M> {
    /// Creates a new [`Room`] of the `local` participant over the provided
    /// `channel`.
    #[must_use]
    pub fn new(
        local: UserId,
        channel: Rc<dyn SignalingChannel>,
        media: M,
        settings: CallSettings,
    ) -> Self {
        let (tasks_tx, tasks_rx) = mpsc::unbounded();
        let (peer_events_tx, peer_events_rx) = mpsc::unbounded();

        Self {
            inner: Rc::new(InnerRoom {
                local,
                channel,
                media,
                settings,
                presence: RefCell::new(PresenceSet::default()),
                pending_offer: RefCell::new(None),
                call: RefCell::new(None),
                last_call_id: Cell::new(CallId::default()),
                peer_events_tx,
                event_subs: RefCell::new(Vec::new()),
            }),
            tasks: tasks_tx,
            inputs: RefCell::new(Some(LoopInputs {
                tasks: tasks_rx,
                peer_events: peer_events_rx,
            })),
        }
    }

    /// Returns a new [`RoomHandle`] of this [`Room`].
    #[must_use]
    pub fn new_handle(&self) -> RoomHandle<M> {
        RoomHandle {
            inner: Rc::downgrade(&self.inner),
            tasks: self.tasks.clone(),
        }
    }

    /// Indicates whether the provided [`RoomHandle`] is a handle of this
    /// [`Room`].
    #[must_use]
    pub fn owns(&self, handle: &RoomHandle<M>) -> bool {
        Weak::ptr_eq(&handle.inner, &Rc::downgrade(&self.inner))
    }

    /// Subscribes to the [`RoomEvent`]s of this [`Room`].
    pub fn on_event(
        &self,
    ) -> LocalBoxStream<'static, RoomEvent<M::RemoteTrack>> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.event_subs.borrow_mut().push(tx);

        Box::pin(rx)
    }

    /// Returns the event loop of this [`Room`].
    ///
    /// Resolves once the [`Room`] is dropped or all its inputs are exhausted.
    /// Only the first call returns a working loop.
    pub fn run(&self) -> LocalBoxFuture<'static, ()> {
        let inputs = if let Some(inputs) = self.inputs.borrow_mut().take() {
            inputs
        } else {
            log::error!("Event loop of the Room is already taken");
            return Box::pin(future::ready(()));
        };
        let mut messages = self.inner.channel.on_message().fuse();
        let mut states = self.inner.channel.on_state_change().fuse();
        let mut peer_events = inputs.peer_events.fuse();
        let mut tasks = inputs.tasks.fuse();
        let room = Rc::downgrade(&self.inner);

        Box::pin(async move {
            loop {
                futures::select! {
                    msg = messages.select_next_some() => {
                        if let Some(this) = room.upgrade() {
                            this.on_server_msg(msg).await;
                        } else {
                            break;
                        }
                    },
                    state = states.select_next_some() => {
                        if let Some(this) = room.upgrade() {
                            this.on_transport_state(state);
                        } else {
                            break;
                        }
                    },
                    event = peer_events.select_next_some() => {
                        if let Some(this) = room.upgrade() {
                            this.on_peer_event(event);
                        } else {
                            break;
                        }
                    },
                    task = tasks.select_next_some() => {
                        if let Some(this) = room.upgrade() {
                            task(this).await;
                        } else {
                            break;
                        }
                    },
                    complete => break,
                }
            }
            log::debug!("Room event loop is finished");
        })
    }
}

impl<M: MediaCapability> Drop for Room<M> {
    fn drop(&mut self) {
        self.inner.end_call(EndReason::Local, true);
    }
}

/// Handle of a [`Room`], used by the UI.
///
/// Call set up actions are queued into the event loop of the [`Room`], so
/// they never interleave with the handling of inbound messages. Others are
/// performed right away.
pub struct RoomHandle<M: MediaCapability> {
    inner: Weak<InnerRoom<M>>,
    tasks: mpsc::UnboundedSender<Task<M>>,
}

impl<M: MediaCapability> Clone for RoomHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
            tasks: self.tasks.clone(),
        }
    }
}

impl<M: MediaCapability> RoomHandle<M> {
    fn upgrade(&self) -> Result<Rc<InnerRoom<M>>, Traced<CallError>> {
        self.inner
            .upgrade()
            .ok_or_else(|| tracerr::new!(CallError::RoomClosed))
    }

    /// Runs the provided action in the event loop of the [`Room`] and waits
    /// for its result.
    async fn schedule<F, Fut>(
        &self,
        action: F,
    ) -> Result<(), Traced<CallError>>
    where
        F: FnOnce(Rc<InnerRoom<M>>) -> Fut + 'static,
        Fut: Future<Output = Result<(), Traced<CallError>>> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task<M> = Box::new(move |room| {
            Box::pin(async move {
                let _ = tx.send(action(room).await);
            })
        });
        self.tasks
            .unbounded_send(task)
            .map_err(|_| tracerr::new!(CallError::RoomClosed))?;

        rx.await.map_err(|_| tracerr::new!(CallError::RoomClosed))?
    }

    /// Returns ID of the local participant.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn local_user(&self) -> Result<UserId, Traced<CallError>> {
        Ok(self.upgrade()?.local.clone())
    }

    /// Returns the participants currently in the room.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn online(&self) -> Result<Vec<UserId>, Traced<CallError>> {
        Ok(self.upgrade()?.presence.borrow().to_vec())
    }

    /// Returns status of the call, [`CallStatus::Idle`] if there is none.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn call_status(&self) -> Result<CallStatus, Traced<CallError>> {
        Ok(self
            .upgrade()?
            .current_call()
            .map_or(CallStatus::Idle, |c| c.status()))
    }

    /// Returns peer of the call, if there is one.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn call_peer(&self) -> Result<Option<UserId>, Traced<CallError>> {
        Ok(self
            .upgrade()?
            .current_call()
            .map(|c| c.peer_id().clone()))
    }

    /// Returns the caller and the kind of the incoming call awaiting the
    /// user's decision, if any.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn incoming_call(
        &self,
    ) -> Result<Option<(UserId, CallKind)>, Traced<CallError>> {
        Ok(self
            .upgrade()?
            .pending_offer
            .borrow()
            .as_ref()
            .map(|p| (p.from.clone(), p.kind)))
    }

    /// Posts a chat message.
    ///
    /// # Errors
    ///
    /// With [`CallError::Transport`] if the message cannot be sent.
    pub fn send_message(
        &self,
        content: String,
    ) -> Result<(), Traced<CallError>> {
        self.upgrade()?.send(&ClientMsg::Message { content })
    }

    /// Reacts to a chat message with the provided `emoji`.
    ///
    /// # Errors
    ///
    /// With [`CallError::Transport`] if the message cannot be sent.
    pub fn add_reaction(
        &self,
        message_id: MessageId,
        emoji: String,
    ) -> Result<(), Traced<CallError>> {
        self.upgrade()?
            .send(&ClientMsg::AddReaction { message_id, emoji })
    }

    /// Withdraws the reaction to a chat message with the provided `emoji`.
    ///
    /// # Errors
    ///
    /// With [`CallError::Transport`] if the message cannot be sent.
    pub fn remove_reaction(
        &self,
        message_id: MessageId,
        emoji: String,
    ) -> Result<(), Traced<CallError>> {
        self.upgrade()?
            .send(&ClientMsg::RemoveReaction { message_id, emoji })
    }

    /// Calls the provided `peer`, resolving once the offer is sent.
    ///
    /// # Errors
    ///
    /// - [`CallError::Busy`] if there is a call or an incoming call already;
    /// - [`CallError::SelfCall`] if `peer` is the local participant;
    /// - [`CallError::PeerOffline`] if `peer` is not in the room;
    /// - [`CallError::MediaAcquisition`], [`CallError::Negotiation`] or
    ///   [`CallError::Transport`] if the call fails to set up;
    /// - [`CallError::Cancelled`] if the call is hung up meanwhile.
    pub async fn start_call(
        &self,
        peer: UserId,
        kind: CallKind,
    ) -> Result<(), Traced<CallError>> {
        self.schedule(move |room| room.start_call(peer, kind)).await
    }

    /// Accepts the incoming call, resolving once the answer is sent.
    ///
    /// # Errors
    ///
    /// - [`CallError::NoPendingOffer`] if there is no incoming call;
    /// - [`CallError::MediaAcquisition`], [`CallError::Negotiation`] or
    ///   [`CallError::Transport`] if the call fails to set up;
    /// - [`CallError::Cancelled`] if the call is hung up meanwhile.
    pub async fn accept_call(&self) -> Result<(), Traced<CallError>> {
        self.schedule(InnerRoom::accept_call).await
    }

    /// Rejects the incoming call.
    ///
    /// # Errors
    ///
    /// With [`CallError::NoPendingOffer`] if there is no incoming call.
    pub fn reject_call(&self) -> Result<(), Traced<CallError>> {
        self.upgrade()?.reject_call()
    }

    /// Hangs up the call, releasing its media before returning.
    ///
    /// Does nothing if there is no call.
    ///
    /// # Errors
    ///
    /// With [`CallError::RoomClosed`] if the [`Room`] is dropped.
    pub fn end_call(&self) -> Result<(), Traced<CallError>> {
        self.upgrade()?.end_call(EndReason::Local, true);
        Ok(())
    }

    /// Mutes or unmutes the local track of the provided [`MediaKind`].
    ///
    /// # Errors
    ///
    /// - [`CallError::NoActiveCall`] if there is no call;
    /// - [`CallError::NoTrack`] if the call has no such track.
    pub fn set_muted(
        &self,
        kind: MediaKind,
        muted: bool,
    ) -> Result<(), Traced<CallError>> {
        self.upgrade()?
            .current_call()
            .ok_or_else(|| tracerr::new!(CallError::NoActiveCall))?
            .set_muted(kind, muted)
            .map_err(tracerr::wrap!())
    }
}

/// Actual data of a [`Room`].
struct InnerRoom<M: MediaCapability> {
    /// ID of the local participant.
    local: UserId,

    channel: Rc<dyn SignalingChannel>,
    media: M,
    settings: CallSettings,
    presence: RefCell<PresenceSet>,
    pending_offer: RefCell<Option<PendingOffer>>,

    /// The only call of the local participant.
    call: RefCell<Option<Rc<CallSession<M>>>>,

    /// [`CallId`] of the latest call.
    last_call_id: Cell<CallId>,

    /// Sender handed to every negotiation engine of this room.
    peer_events_tx: mpsc::UnboundedSender<PeerEvent<M::RemoteTrack>>,

    /// Subscribers of [`Room::on_event()`].
    event_subs: RefCell<Vec<EventSender<M::RemoteTrack>>>,
}

impl<M: MediaCapability> InnerRoom<M> {
    fn emit(&self, event: RoomEvent<M::RemoteTrack>) {
        let mut subs = self.event_subs.borrow_mut();
        subs.retain(|sub| !sub.is_closed());
        for sub in subs.iter() {
            let _ = sub.unbounded_send(event.clone());
        }
    }

    fn send(&self, msg: &ClientMsg) -> Result<(), Traced<CallError>> {
        self.channel
            .send(msg)
            .map_err(tracerr::map_from_and_wrap!(=> CallError))
    }

    fn current_call(&self) -> Option<Rc<CallSession<M>>> {
        self.call.borrow().as_ref().map(Rc::clone)
    }

    fn is_current(&self, session: &Rc<CallSession<M>>) -> bool {
        self.call
            .borrow()
            .as_ref()
            .map_or(false, |c| Rc::ptr_eq(c, session))
    }

    fn status_changed(&self, session: &CallSession<M>) {
        self.emit(RoomEvent::CallStatusChanged {
            peer: session.peer_id().clone(),
            status: session.status(),
        });
    }

    /// Decides the [`Route`] of the provided [`ServerMsg`] and applies it.
    async fn on_server_msg(&self, msg: ServerMsg) {
        let route = {
            let call = self.call.borrow();
            let pending = self.pending_offer.borrow();
            MessageRouter::new(
                &self.local,
                call.as_ref().map(|c| c.peer_id()),
                pending.as_ref().map(|p| &p.from),
            )
            .route(msg)
        };

        match route {
            Route::Chat(msg) => self.emit(RoomEvent::ChatMessage(msg)),
            Route::Reactions {
                user,
                message_id,
                emoji,
                users,
                reactions,
            } => self.emit(RoomEvent::ReactionsUpdated {
                user,
                message_id,
                emoji,
                users,
                reactions,
            }),
            Route::Presence {
                joined,
                left,
                online,
            } => self.on_presence(joined, left, online),
            Route::IncomingOffer { from, kind, offer } => {
                log::info!("Incoming {} call from {}", kind, from);
                self.pending_offer.replace(Some(PendingOffer {
                    from: from.clone(),
                    kind,
                    offer,
                    candidates: CandidateQueue::new(),
                }));
                self.emit(RoomEvent::IncomingCall { from, kind });
            }
            Route::Answer { accepted, sdp } => {
                self.on_answer(accepted, sdp).await;
            }
            Route::RemoteCandidate(candidate) => {
                self.on_remote_candidate(candidate).await;
            }
            Route::PendingCandidate(candidate) => {
                if let Some(pending) = self.pending_offer.borrow().as_ref() {
                    let _ = pending.candidates.enqueue(candidate);
                }
            }
            Route::RemoteHangup => {
                self.end_call(EndReason::RemoteHangup, false);
            }
            Route::OfferWithdrawn => self.withdraw_pending_offer(),
            Route::Ignore(reason) => {
                log::debug!("Ignoring server message: {}", reason);
            }
        }
    }

    fn on_presence(
        &self,
        joined: Option<UserId>,
        left: Option<UserId>,
        online: Vec<UserId>,
    ) {
        self.presence.borrow_mut().replace(online.iter().cloned());
        self.emit(RoomEvent::PresenceChanged {
            joined,
            left,
            online,
        });

        let peer_left = self.current_call().map_or(false, |c| {
            !self.presence.borrow().contains(c.peer_id())
        });
        if peer_left {
            self.end_call(EndReason::PeerLeft, false);
        }
        let offerer_left =
            self.pending_offer.borrow().as_ref().map_or(false, |p| {
                !self.presence.borrow().contains(&p.from)
            });
        if offerer_left {
            self.withdraw_pending_offer();
        }
    }

    fn withdraw_pending_offer(&self) {
        let pending = self.pending_offer.borrow_mut().take();
        if let Some(pending) = pending {
            log::info!("Incoming call from {} is withdrawn", pending.from);
            self.emit(RoomEvent::IncomingCallWithdrawn { from: pending.from });
        }
    }

    async fn on_answer(&self, accepted: bool, sdp: Option<SessionDescription>) {
        let session = if let Some(session) = self.current_call() {
            session
        } else {
            return;
        };

        match session.handle_answer(accepted, sdp).await {
            Ok(AnswerOutcome::Connected) => {
                if self.is_current(&session) {
                    self.status_changed(&session);
                }
            }
            Ok(AnswerOutcome::Rejected) => {
                if self.is_current(&session) {
                    self.end_call(EndReason::Rejected, false);
                }
            }
            Ok(AnswerOutcome::HungUp) => {
                if self.is_current(&session) {
                    self.end_call(EndReason::RemoteHangup, false);
                }
            }
            Ok(AnswerOutcome::Ignored) => {
                log::debug!(
                    "Ignoring answer of {} to call {} in {} status",
                    session.peer_id(),
                    session.id(),
                    session.status(),
                );
            }
            Err(e) => self.fail_call(&session, e),
        }
    }

    async fn on_remote_candidate(&self, candidate: IceCandidate) {
        if let Some(session) = self.current_call() {
            if let Err(e) = session.handle_remote_candidate(candidate).await {
                self.fail_call(&session, e);
            }
        }
    }

    fn on_peer_event(&self, event: PeerEvent<M::RemoteTrack>) {
        let PeerEvent { call_id, event } = event;
        let session = match self.current_call() {
            Some(session) if session.id() == call_id => session,
            _ => {
                log::debug!("Dropping event of ended call {}", call_id);
                return;
            }
        };

        match event {
            EngineEvent::IceCandidateDiscovered(candidate) => {
                let msg = ClientMsg::IceCandidate {
                    from_user: self.local.clone(),
                    to_user: session.peer_id().clone(),
                    candidate,
                };
                if let Err(e) = self.send(&msg) {
                    log::warn!("Failed to send local ICE candidate: {}", e);
                }
            }
            EngineEvent::RemoteTrackAdded(track) => {
                self.emit(RoomEvent::RemoteTrackAdded {
                    peer: session.peer_id().clone(),
                    track,
                });
            }
        }
    }

    fn on_transport_state(&self, state: TransportState) {
        if let TransportState::Closed(msg) = state {
            log::warn!("Signalling channel is closed: {}", msg);
            self.end_call(EndReason::ChannelClosed, false);
            self.withdraw_pending_offer();
            self.emit(RoomEvent::ConnectionClosed(msg));
        }
    }

    /// Creates a new [`CallSession`] and makes it the current one.
    fn begin_call(
        &self,
        role: Role,
        peer: UserId,
        kind: CallKind,
        candidates: CandidateQueue,
    ) -> Rc<CallSession<M>> {
        let id = self.last_call_id.get().next();
        self.last_call_id.set(id);
        log::info!("Starting {} call {} with {} as {}", kind, id, peer, role);

        let session =
            Rc::new(CallSession::new(id, role, peer, kind, candidates));
        self.call.replace(Some(Rc::clone(&session)));
        self.status_changed(&session);

        session
    }

    async fn acquire_media(
        &self,
        session: &CallSession<M>,
    ) -> Result<(), Traced<CallError>> {
        let events =
            EngineEvents::new(session.id(), self.peer_events_tx.clone());
        session
            .acquire_media(&self.media, &self.settings.ice_servers, events)
            .await
    }

    /// Errors with [`CallError::Cancelled`] if the provided call was ended
    /// while its set up was suspended.
    fn ensure_current(
        &self,
        session: &Rc<CallSession<M>>,
    ) -> Result<(), Traced<CallError>> {
        if self.is_current(session) {
            Ok(())
        } else {
            session.teardown();
            Err(tracerr::new!(CallError::Cancelled))
        }
    }

    /// Ends the provided call after its set up failed.
    ///
    /// A call ended meanwhile fails with [`CallError::Cancelled`] instead,
    /// since its engine errors once closed.
    fn abort_setup(
        &self,
        session: &Rc<CallSession<M>>,
        err: Traced<CallError>,
    ) -> Traced<CallError> {
        if self.is_current(session) {
            log::error!(
                "Failed to set up call {} with {}: {}",
                session.id(),
                session.peer_id(),
                err,
            );
            self.end_call(EndReason::Failed(err.as_ref().clone()), true);
            err
        } else {
            log::debug!(
                "Call {} ended while being set up: {}",
                session.id(),
                err,
            );
            session.teardown();
            tracerr::new!(CallError::Cancelled)
        }
    }

    /// Ends the provided call after its negotiation failed.
    fn fail_call(&self, session: &Rc<CallSession<M>>, err: Traced<CallError>) {
        log::error!(
            "Call {} with {} failed: {}",
            session.id(),
            session.peer_id(),
            err,
        );
        if self.is_current(session) {
            self.end_call(EndReason::Failed(err.into_inner()), true);
        }
    }

    /// Tears down the current call, if any, telling its peer if
    /// `notify_peer` is set.
    ///
    /// Returns `false` if there was no call.
    fn end_call(&self, reason: EndReason, notify_peer: bool) -> bool {
        let session = self.call.borrow_mut().take();
        let session = if let Some(session) = session {
            session
        } else {
            return false;
        };

        if notify_peer {
            if let Some(msg) = session.hangup_message(&self.local) {
                if let Err(e) = self.send(&msg) {
                    log::warn!(
                        "Failed to notify {} about hang up: {}",
                        session.peer_id(),
                        e,
                    );
                }
            }
        }
        session.teardown();
        log::info!(
            "Call {} with {} ended: {}",
            session.id(),
            session.peer_id(),
            reason,
        );

        let peer = session.peer_id().clone();
        self.status_changed(&session);
        self.emit(RoomEvent::CallEnded { peer, reason });
        true
    }

    async fn start_call(
        self: Rc<Self>,
        peer: UserId,
        kind: CallKind,
    ) -> Result<(), Traced<CallError>> {
        if self.call.borrow().is_some() || self.pending_offer.borrow().is_some()
        {
            return Err(tracerr::new!(CallError::Busy));
        }
        if peer == self.local {
            return Err(tracerr::new!(CallError::SelfCall));
        }
        if !self.presence.borrow().contains(&peer) {
            return Err(tracerr::new!(CallError::PeerOffline(peer)));
        }

        let session =
            self.begin_call(Role::Caller, peer, kind, CandidateQueue::new());
        if let Err(e) = self.acquire_media(&session).await {
            return Err(self.abort_setup(&session, e));
        }
        self.ensure_current(&session)?;

        let offer = match session.make_offer(&self.local).await {
            Ok(offer) => offer,
            Err(e) => return Err(self.abort_setup(&session, e)),
        };
        self.ensure_current(&session)?;
        if let Err(e) = self.send(&offer) {
            return Err(self.abort_setup(&session, e));
        }
        self.status_changed(&session);

        Ok(())
    }

    async fn accept_call(self: Rc<Self>) -> Result<(), Traced<CallError>> {
        if self.call.borrow().is_some() {
            return Err(tracerr::new!(CallError::Busy));
        }
        let pending = self
            .pending_offer
            .borrow_mut()
            .take()
            .ok_or_else(|| tracerr::new!(CallError::NoPendingOffer))?;
        let PendingOffer {
            from,
            kind,
            offer,
            candidates,
        } = pending;

        let session = self.begin_call(Role::Callee, from, kind, candidates);
        if let Err(e) = self.acquire_media(&session).await {
            return Err(self.abort_setup(&session, e));
        }
        self.ensure_current(&session)?;

        let answer = match session.answer_offer(&self.local, offer).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.abort_setup(&session, e)),
        };
        self.ensure_current(&session)?;
        if let Err(e) = self.send(&answer) {
            return Err(self.abort_setup(&session, e));
        }
        self.status_changed(&session);
        session.answer_delivered();
        self.status_changed(&session);

        Ok(())
    }

    fn reject_call(&self) -> Result<(), Traced<CallError>> {
        let pending = self
            .pending_offer
            .borrow_mut()
            .take()
            .ok_or_else(|| tracerr::new!(CallError::NoPendingOffer))?;
        log::info!("Rejecting call from {}", pending.from);

        self.send(&ClientMsg::reject_call(self.local.clone(), pending.from))
            .map_err(tracerr::wrap!())
    }
}
