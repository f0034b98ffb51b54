//! One-to-one call negotiated over the signalling channel.

mod ice_candidates;
mod state;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_more::Display;
use huddle_client_api_proto::{
    CallKind, ClientMsg, IceCandidate, IceServer, MediaKind, SdpType,
    SessionDescription, UserId,
};
use tracerr::Traced;

use crate::{
    platform::{
        EngineEvents, LocalTracks as _, MediaCapability, MediaError,
        NegotiationEngine as _, NegotiationError, TransportError,
    },
    utils::ErrorName,
};

#[doc(inline)]
pub use self::{
    ice_candidates::CandidateQueue,
    state::{CallStatus, Role},
};

/// Sequence number of a [`CallSession`] within a `Room`.
///
/// Events of a negotiation engine are tagged with it, so the events of an
/// already ended call are told apart from the current one.
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub struct CallId(pub u32);

impl CallId {
    /// Returns the [`CallId`] following this one.
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Errors of call operations.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum CallError {
    /// Local media couldn't be acquired.
    #[display(fmt = "{}", _0)]
    MediaAcquisition(MediaError),

    /// Negotiation failed, the call is ended.
    #[display(fmt = "{}", _0)]
    Negotiation(NegotiationError),

    /// Signalling message couldn't be sent.
    #[display(fmt = "{}", _0)]
    Transport(TransportError),

    /// Another call is in progress or awaits an answer.
    #[display(fmt = "Another call is already in progress")]
    Busy,

    /// There is no incoming call to answer.
    #[display(fmt = "There is no incoming call to answer")]
    NoPendingOffer,

    /// There is no call to operate on.
    #[display(fmt = "There is no active call")]
    NoActiveCall,

    /// The local participant tried to call itself.
    #[display(fmt = "Cannot call yourself")]
    SelfCall,

    /// Callee is not in the room.
    #[display(fmt = "{} is not in the room", _0)]
    PeerOffline(UserId),

    /// The call carries no track of this [`MediaKind`].
    #[display(fmt = "Call has no {} track", _0)]
    NoTrack(MediaKind),

    /// The call was ended while it was being set up.
    #[display(fmt = "Call was ended while being set up")]
    Cancelled,

    /// The `Room` is already dropped.
    #[display(fmt = "Room is closed")]
    RoomClosed,
}

impl ErrorName for CallError {
    fn name(&self) -> &'static str {
        match self {
            Self::MediaAcquisition(e) => e.name(),
            Self::Negotiation(e) => e.name(),
            Self::Transport(e) => e.name(),
            Self::Busy => "Busy",
            Self::NoPendingOffer => "NoPendingOffer",
            Self::NoActiveCall => "NoActiveCall",
            Self::SelfCall => "SelfCall",
            Self::PeerOffline(_) => "PeerOffline",
            Self::NoTrack(_) => "NoTrack",
            Self::Cancelled => "Cancelled",
            Self::RoomClosed => "RoomClosed",
        }
    }
}

impl From<MediaError> for CallError {
    #[inline]
    fn from(err: MediaError) -> Self {
        Self::MediaAcquisition(err)
    }
}

impl From<NegotiationError> for CallError {
    #[inline]
    fn from(err: NegotiationError) -> Self {
        Self::Negotiation(err)
    }
}

impl From<TransportError> for CallError {
    #[inline]
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

type Result<T> = std::result::Result<T, Traced<CallError>>;

/// Result of handling an answer to the offer of a [`CallSession`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnswerOutcome {
    /// The callee accepted, the call is [`CallStatus::Connected`].
    Connected,

    /// The callee rejected the call.
    Rejected,

    /// The peer hung up the call.
    HungUp,

    /// The answer is out of place and was ignored.
    Ignored,
}

/// Local media of a call: its tracks and the engine sending them.
struct MediaHandle<M: MediaCapability> {
    tracks: M::Tracks,
    engine: Rc<M::Engine>,
}

/// Negotiation state of a single one-to-one call.
///
/// The session owns the local media of the call exclusively and releases it
/// exactly once, in [`CallSession::teardown()`].
pub struct CallSession<M: MediaCapability> {
    id: CallId,
    role: Role,
    peer_id: UserId,
    kind: CallKind,
    status: Cell<CallStatus>,

    /// Description committed as local. Set at most once.
    local_description: RefCell<Option<SessionDescription>>,

    /// Description committed as remote. Set at most once.
    remote_description: RefCell<Option<SessionDescription>>,

    /// Remote candidates awaiting the remote description.
    candidates: CandidateQueue,

    /// `None` before the media is acquired and after the teardown.
    media: RefCell<Option<MediaHandle<M>>>,

    /// Whether [`CallSession::teardown()`] was called.
    released: Cell<bool>,
}

impl<M: MediaCapability> CallSession<M> {
    /// Creates a new [`CallSession`] in [`CallStatus::AwaitingMedia`].
    ///
    /// The provided [`CandidateQueue`] may already hold candidates the peer
    /// sent along with its offer.
    #[must_use]
    pub fn new(
        id: CallId,
        role: Role,
        peer_id: UserId,
        kind: CallKind,
        candidates: CandidateQueue,
    ) -> Self {
        Self {
            id,
            role,
            peer_id,
            kind,
            status: Cell::new(CallStatus::AwaitingMedia),
            local_description: RefCell::new(None),
            remote_description: RefCell::new(None),
            candidates,
            media: RefCell::new(None),
            released: Cell::new(false),
        }
    }

    /// Returns [`CallId`] of this [`CallSession`].
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Returns [`Role`] of the local participant in this call.
    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns ID of the remote participant.
    #[inline]
    #[must_use]
    pub fn peer_id(&self) -> &UserId {
        &self.peer_id
    }

    /// Returns [`CallKind`] of this call.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Returns current [`CallStatus`] of this call.
    #[inline]
    #[must_use]
    pub fn status(&self) -> CallStatus {
        self.status.get()
    }

    /// Returns the committed local description, if any.
    #[must_use]
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.borrow().clone()
    }

    /// Returns the committed remote description, if any.
    #[must_use]
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.borrow().clone()
    }

    /// Indicates whether the remote description is committed to the engine.
    #[inline]
    #[must_use]
    pub fn is_remote_description_applied(&self) -> bool {
        self.candidates.is_remote_description_applied()
    }

    /// Returns count of remote candidates awaiting the remote description.
    #[inline]
    #[must_use]
    pub fn queued_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Indicates whether the media of this call is acquired and not released
    /// yet.
    #[must_use]
    pub fn has_media(&self) -> bool {
        self.media.borrow().is_some()
    }

    /// Indicates whether [`CallSession::teardown()`] was called.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    fn set_status(&self, status: CallStatus) {
        let old = self.status.replace(status);
        if old != status {
            log::debug!(
                "Call {} with {}: {} -> {}",
                self.id,
                self.peer_id,
                old,
                status,
            );
        }
    }

    fn engine(&self) -> Result<Rc<M::Engine>> {
        self.media
            .borrow()
            .as_ref()
            .map(|h| Rc::clone(&h.engine))
            .ok_or_else(|| {
                tracerr::new!(CallError::Negotiation(
                    NegotiationError::EngineReleased
                ))
            })
    }

    /// Acquires local media of this call and creates its negotiation engine,
    /// reporting to the provided [`EngineEvents`].
    ///
    /// # Errors
    ///
    /// With [`CallError::MediaAcquisition`] if the media cannot be acquired,
    /// with [`CallError::Negotiation`] if the engine cannot be created and
    /// with [`CallError::Cancelled`] if the session was torn down meanwhile.
    /// Nothing stays acquired on error.
    pub async fn acquire_media(
        &self,
        media: &M,
        ice_servers: &[IceServer],
        events: EngineEvents<M::RemoteTrack>,
    ) -> Result<()> {
        let tracks = media
            .acquire_local_media(self.kind)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        if self.is_released() {
            tracks.stop();
            return Err(tracerr::new!(CallError::Cancelled));
        }

        let engine = media
            .create_negotiation_engine(ice_servers, events)
            .map_err(|e| {
                tracks.stop();
                e
            })
            .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        engine
            .add_local_tracks(&tracks)
            .map_err(|e| {
                engine.close();
                tracks.stop();
                e
            })
            .map_err(tracerr::map_from_and_wrap!(=> CallError))?;

        self.media.replace(Some(MediaHandle {
            tracks,
            engine: Rc::new(engine),
        }));
        Ok(())
    }

    /// Creates and commits the local offer, returning the
    /// [`ClientMsg::CallOffer`] to be sent by `local`.
    ///
    /// Moves this call to [`CallStatus::OfferSent`].
    ///
    /// # Errors
    ///
    /// With [`CallError::Negotiation`] if this session is not a caller's one
    /// or the engine fails.
    pub async fn make_offer(&self, local: &UserId) -> Result<ClientMsg> {
        if self.role != Role::Caller {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::OfferByCallee
            )));
        }
        let offer = self.commit_local(SdpType::Offer).await?;
        self.set_status(CallStatus::OfferSent);

        Ok(ClientMsg::CallOffer {
            from_user: local.clone(),
            to_user: self.peer_id.clone(),
            call_type: self.kind,
            sdp: offer,
        })
    }

    /// Applies the peer's `offer`, then creates and commits the local answer,
    /// returning the accepting [`ClientMsg::CallAnswer`] to be sent by
    /// `local`.
    ///
    /// Moves this call through [`CallStatus::OfferReceived`] to
    /// [`CallStatus::AnswerSent`].
    ///
    /// # Errors
    ///
    /// With [`CallError::Negotiation`] if this session is not a callee's one,
    /// `offer` is not an offer or the engine fails.
    pub async fn answer_offer(
        &self,
        local: &UserId,
        offer: SessionDescription,
    ) -> Result<ClientMsg> {
        if self.role != Role::Callee {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::AnswerByCaller
            )));
        }
        if offer.kind != SdpType::Offer {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::UnexpectedSdpType {
                    expected: SdpType::Offer,
                    actual: offer.kind,
                }
            )));
        }
        self.set_status(CallStatus::OfferReceived);
        self.apply_remote_description(offer).await?;
        let answer = self.commit_local(SdpType::Answer).await?;
        self.set_status(CallStatus::AnswerSent);

        Ok(ClientMsg::accept_call(
            local.clone(),
            self.peer_id.clone(),
            answer,
        ))
    }

    /// Moves this call from [`CallStatus::AnswerSent`] to
    /// [`CallStatus::Connected`] once the answer is handed to the peer.
    pub fn answer_delivered(&self) {
        if self.status() == CallStatus::AnswerSent {
            self.set_status(CallStatus::Connected);
        }
    }

    /// Handles the peer's answer to the offer of this call.
    ///
    /// A declining answer is [`AnswerOutcome::Rejected`] while a caller waits
    /// for the answer and [`AnswerOutcome::HungUp`] otherwise, in both roles.
    /// Tearing down is up to the caller of this method. Accepting answers
    /// received by a callee or in any status but [`CallStatus::OfferSent`]
    /// are [`AnswerOutcome::Ignored`].
    ///
    /// # Errors
    ///
    /// With [`CallError::Negotiation`] if the accepting answer has no valid
    /// description or the engine fails to apply it.
    pub async fn handle_answer(
        &self,
        accepted: bool,
        sdp: Option<SessionDescription>,
    ) -> Result<AnswerOutcome> {
        let status = self.status();
        if !accepted {
            let rejected =
                self.role == Role::Caller && status == CallStatus::OfferSent;
            return Ok(if rejected {
                AnswerOutcome::Rejected
            } else {
                AnswerOutcome::HungUp
            });
        }
        if self.role != Role::Caller || status != CallStatus::OfferSent {
            return Ok(AnswerOutcome::Ignored);
        }

        let answer = sdp.ok_or_else(|| {
            tracerr::new!(CallError::Negotiation(
                NegotiationError::MissingAnswer
            ))
        })?;
        if answer.kind != SdpType::Answer {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::UnexpectedSdpType {
                    expected: SdpType::Answer,
                    actual: answer.kind,
                }
            )));
        }
        self.apply_remote_description(answer).await?;
        self.set_status(CallStatus::Connected);

        Ok(AnswerOutcome::Connected)
    }

    /// Applies the provided remote [`IceCandidate`], or buffers it until the
    /// remote description is applied.
    ///
    /// # Errors
    ///
    /// With [`CallError::Negotiation`] if the engine refuses the candidate.
    pub async fn handle_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<()> {
        if let Some(candidate) = self.candidates.enqueue(candidate) {
            self.engine()?
                .add_ice_candidate(candidate)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        }
        Ok(())
    }

    /// Mutes or unmutes the local track of the provided [`MediaKind`].
    ///
    /// # Errors
    ///
    /// With [`CallError::NoTrack`] if this call has no such track.
    pub fn set_muted(&self, kind: MediaKind, muted: bool) -> Result<()> {
        let media = self.media.borrow();
        let enabled = self.kind.includes(kind)
            && media
                .as_ref()
                .map_or(false, |h| h.tracks.set_enabled(kind, !muted));
        if enabled {
            Ok(())
        } else {
            Err(tracerr::new!(CallError::NoTrack(kind)))
        }
    }

    /// Returns the message telling the peer that `local` hangs up, if the
    /// peer knows about this call already.
    ///
    /// It is a rejecting [`ClientMsg::CallAnswer`] in every status, which the
    /// peer treats as a rejection or a hangup depending on its own status.
    #[must_use]
    pub fn hangup_message(&self, local: &UserId) -> Option<ClientMsg> {
        if self.status().is_known_to_peer(self.role) {
            Some(ClientMsg::reject_call(local.clone(), self.peer_id.clone()))
        } else {
            None
        }
    }

    /// Ends this call, closing its engine and stopping its tracks.
    ///
    /// Returns `true` if the media was released by this very call; calling it
    /// again is a no-op.
    pub fn teardown(&self) -> bool {
        self.released.set(true);
        let handle = self.media.borrow_mut().take();
        self.candidates.clear();
        self.set_status(CallStatus::Ended);

        if let Some(handle) = handle {
            handle.engine.close();
            handle.tracks.stop();
            true
        } else {
            false
        }
    }

    /// Creates a local description of the provided [`SdpType`] and commits
    /// it.
    async fn commit_local(&self, kind: SdpType) -> Result<SessionDescription> {
        if self.local_description.borrow().is_some() {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::LocalDescriptionAlreadySet
            )));
        }
        let engine = self.engine()?;
        let desc = match kind {
            SdpType::Offer => engine.create_offer().await,
            SdpType::Answer => engine.create_answer().await,
        }
        .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        engine
            .set_local_description(desc.clone())
            .await
            .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        self.local_description.replace(Some(desc.clone()));

        Ok(desc)
    }

    /// Commits the remote description and applies the candidates buffered
    /// before it, in arrival order.
    async fn apply_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<()> {
        if self.remote_description.borrow().is_some() {
            return Err(tracerr::new!(CallError::Negotiation(
                NegotiationError::RemoteDescriptionAlreadySet
            )));
        }
        let engine = self.engine()?;
        engine
            .set_remote_description(desc.clone())
            .await
            .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        self.remote_description.replace(Some(desc));

        for candidate in self.candidates.flush() {
            engine
                .add_ice_candidate(candidate)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> CallError))?;
        }
        Ok(())
    }
}

impl<M: MediaCapability> Drop for CallSession<M> {
    fn drop(&mut self) {
        if self.teardown() {
            log::warn!("Call {} was dropped without teardown", self.id);
        }
    }
}
