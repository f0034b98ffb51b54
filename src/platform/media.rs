//! Local media acquisition and peer-to-peer negotiation primitives the calls
//! are built upon.

use async_trait::async_trait;
use derive_more::Display;
use futures::channel::mpsc;
use huddle_client_api_proto::{
    CallKind, IceCandidate, IceServer, MediaKind, SdpType, SessionDescription,
};
use tracerr::Traced;

use crate::{call::CallId, platform, utils::ErrorName};

/// Local media tracks acquired for a single call.
pub trait LocalTracks {
    /// Enables or disables the track of the provided [`MediaKind`], without
    /// releasing the device.
    ///
    /// Returns `false` if there is no track of this [`MediaKind`].
    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool;

    /// Stops all the tracks, releasing the devices.
    fn stop(&self);
}

/// Single peer-to-peer negotiation (an [RTCPeerConnection][1] in browsers).
///
/// Locally discovered ICE candidates and remote tracks are reported through
/// the [`EngineEvents`] the engine was created with.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
#[async_trait(?Send)]
pub trait NegotiationEngine {
    /// Local tracks this engine sends.
    type Tracks: LocalTracks;

    /// Adds all the provided local tracks to the negotiation.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::AddTracks`] if the platform refuses a track.
    fn add_local_tracks(
        &self,
        tracks: &Self::Tracks,
    ) -> Result<(), Traced<NegotiationError>>;

    /// Obtains a new SDP offer.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::CreateOffer`] if the platform fails.
    async fn create_offer(
        &self,
    ) -> Result<SessionDescription, Traced<NegotiationError>>;

    /// Obtains a new SDP answer to the applied remote offer.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::CreateAnswer`] if the platform fails.
    async fn create_answer(
        &self,
    ) -> Result<SessionDescription, Traced<NegotiationError>>;

    /// Commits the provided local description.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::SetLocalDescription`] if the platform fails.
    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), Traced<NegotiationError>>;

    /// Commits the provided remote description.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::SetRemoteDescription`] if the platform fails.
    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), Traced<NegotiationError>>;

    /// Applies the provided remote [`IceCandidate`].
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::AddIceCandidate`] if the platform fails.
    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), Traced<NegotiationError>>;

    /// Closes the negotiation. No [`EngineEvents`] are emitted afterwards.
    fn close(&self);
}

/// Capability of acquiring local media and creating [`NegotiationEngine`]s.
#[async_trait(?Send)]
pub trait MediaCapability: 'static {
    /// Local tracks acquired by this capability.
    type Tracks: LocalTracks + 'static;

    /// Track received from the remote peer, handed to the UI as is.
    type RemoteTrack: Clone + 'static;

    /// Negotiation engine created by this capability.
    type Engine: NegotiationEngine<Tracks = Self::Tracks> + 'static;

    /// Acquires microphone (and camera, for [`CallKind::Video`]) tracks.
    ///
    /// # Errors
    ///
    /// With [`MediaError`] if the user denies access or there is no device.
    async fn acquire_local_media(
        &self,
        kind: CallKind,
    ) -> Result<Self::Tracks, Traced<MediaError>>;

    /// Creates a new [`NegotiationEngine`] reporting to the provided
    /// [`EngineEvents`].
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::CreatePeer`] if the platform fails.
    fn create_negotiation_engine(
        &self,
        ice_servers: &[IceServer],
        events: EngineEvents<Self::RemoteTrack>,
    ) -> Result<Self::Engine, Traced<NegotiationError>>;
}

/// Event emitted by a [`NegotiationEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent<T> {
    /// Negotiation discovered a new local [`IceCandidate`] which should be
    /// handed to the remote peer.
    IceCandidateDiscovered(IceCandidate),

    /// Remote peer's track has arrived.
    RemoteTrackAdded(T),
}

/// [`EngineEvent`] tagged with the call it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerEvent<T> {
    /// ID of the call whose engine emitted the event.
    pub call_id: CallId,

    /// The event itself.
    pub event: EngineEvent<T>,
}

/// Sender of [`PeerEvent`]s of a single call, handed to its
/// [`NegotiationEngine`].
#[derive(Debug)]
pub struct EngineEvents<T> {
    call_id: CallId,
    tx: mpsc::UnboundedSender<PeerEvent<T>>,
}

impl<T> Clone for EngineEvents<T> {
    fn clone(&self) -> Self {
        Self {
            call_id: self.call_id,
            tx: self.tx.clone(),
        }
    }
}

impl<T> EngineEvents<T> {
    /// Creates new [`EngineEvents`] of the call with the provided [`CallId`].
    #[must_use]
    pub fn new(
        call_id: CallId,
        tx: mpsc::UnboundedSender<PeerEvent<T>>,
    ) -> Self {
        Self { call_id, tx }
    }

    /// Reports a locally discovered [`IceCandidate`].
    pub fn ice_candidate_discovered(&self, candidate: IceCandidate) {
        self.send(EngineEvent::IceCandidateDiscovered(candidate));
    }

    /// Reports a newly arrived remote track.
    pub fn remote_track_added(&self, track: T) {
        self.send(EngineEvent::RemoteTrackAdded(track));
    }

    fn send(&self, event: EngineEvent<T>) {
        let event = PeerEvent {
            call_id: self.call_id,
            event,
        };
        if self.tx.unbounded_send(event).is_err() {
            log::debug!("Call {} events receiver is gone", self.call_id);
        }
    }
}

/// Errors of acquiring local media.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum MediaError {
    /// The user or the browser denied access to the devices.
    #[display(fmt = "Access to media devices was denied: {}", _0)]
    PermissionDenied(platform::Error),

    /// There is no device satisfying the request.
    #[display(fmt = "No media device found: {}", _0)]
    NoDevice(platform::Error),

    /// Any other failure of the platform.
    #[display(fmt = "Failed to acquire local media: {}", _0)]
    Other(platform::Error),
}

impl ErrorName for MediaError {
    fn name(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::NoDevice(_) => "NoDevice",
            Self::Other(_) => "Other",
        }
    }
}

/// Errors of negotiating a call.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum NegotiationError {
    /// Occurs when [RTCPeerConnection][1] cannot be created.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
    #[display(fmt = "Failed to create RTCPeerConnection: {}", _0)]
    CreatePeer(platform::Error),

    /// Occurs when a local track cannot be added to the negotiation.
    #[display(fmt = "Failed to add local track: {}", _0)]
    AddTracks(platform::Error),

    /// Occurs when [createOffer()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-createoffer
    #[display(fmt = "Failed to create SDP offer: {}", _0)]
    CreateOffer(platform::Error),

    /// Occurs when [createAnswer()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-createanswer
    #[display(fmt = "Failed to create SDP answer: {}", _0)]
    CreateAnswer(platform::Error),

    /// Occurs when [setLocalDescription()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-setlocaldescription
    #[display(fmt = "Failed to set local SDP description: {}", _0)]
    SetLocalDescription(platform::Error),

    /// Occurs when [setRemoteDescription()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-setremotedescription
    #[display(fmt = "Failed to set remote SDP description: {}", _0)]
    SetRemoteDescription(platform::Error),

    /// Occurs when [addIceCandidate()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-addicecandidate
    #[display(fmt = "Failed to add ICE candidate: {}", _0)]
    AddIceCandidate(platform::Error),

    /// Callee tried to make an offer.
    #[display(fmt = "Only the caller may offer a call")]
    OfferByCallee,

    /// Caller tried to answer.
    #[display(fmt = "Only the callee may answer a call")]
    AnswerByCaller,

    /// Local description of the call is already set.
    #[display(fmt = "Local description is already set")]
    LocalDescriptionAlreadySet,

    /// Remote description of the call is already set.
    #[display(fmt = "Remote description is already set")]
    RemoteDescriptionAlreadySet,

    /// Received description is of a wrong [`SdpType`].
    #[display(fmt = "Expected {} description, got {}", expected, actual)]
    UnexpectedSdpType {
        /// [`SdpType`] the call expected.
        expected: SdpType,

        /// [`SdpType`] actually received.
        actual: SdpType,
    },

    /// Accepting answer carries no session description.
    #[display(fmt = "Accepting answer has no session description")]
    MissingAnswer,

    /// Media of the call is already released.
    #[display(fmt = "Negotiation engine is already released")]
    EngineReleased,
}

impl ErrorName for NegotiationError {
    fn name(&self) -> &'static str {
        match self {
            Self::CreatePeer(_) => "CreatePeer",
            Self::AddTracks(_) => "AddTracks",
            Self::CreateOffer(_) => "CreateOffer",
            Self::CreateAnswer(_) => "CreateAnswer",
            Self::SetLocalDescription(_) => "SetLocalDescription",
            Self::SetRemoteDescription(_) => "SetRemoteDescription",
            Self::AddIceCandidate(_) => "AddIceCandidate",
            Self::OfferByCallee => "OfferByCallee",
            Self::AnswerByCaller => "AnswerByCaller",
            Self::LocalDescriptionAlreadySet => "LocalDescriptionAlreadySet",
            Self::RemoteDescriptionAlreadySet => "RemoteDescriptionAlreadySet",
            Self::UnexpectedSdpType { .. } => "UnexpectedSdpType",
            Self::MissingAnswer => "MissingAnswer",
            Self::EngineReleased => "EngineReleased",
        }
    }
}
