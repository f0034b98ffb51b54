//! Wrapper around [RTCPeerConnection][1].
//!
//! [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection

use std::{cell::RefCell, rc::Rc};

use async_trait::async_trait;
use huddle_client_api_proto::{
    IceCandidate, IceServer, SdpType, SessionDescription,
};
use js_sys::{Array, Function, Reflect};
use tracerr::Traced;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaStreamTrack, RtcConfiguration, RtcIceCandidateInit,
    RtcIceServer as SysRtcIceServer, RtcPeerConnection as SysRtcPeerConnection,
    RtcPeerConnectionIceEvent, RtcSdpType, RtcSessionDescriptionInit,
    RtcTrackEvent,
};

use crate::platform::{
    self,
    media::{EngineEvents, NegotiationEngine, NegotiationError},
    wasm::{media_devices::BrowserTracks, utils::EventListener},
};

type Result<T> = std::result::Result<T, Traced<NegotiationError>>;

/// Converts the provided [`IceServer`]s into a JS array of
/// [RTCIceServer][1]s.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtciceserver
fn ice_servers_array(servers: &[IceServer]) -> Array {
    servers
        .iter()
        .map(|server| {
            let mut ice = SysRtcIceServer::new();
            let urls: Array =
                server.urls.iter().map(|u| JsValue::from_str(u)).collect();
            ice.urls(&urls);
            if let Some(username) = &server.username {
                ice.username(username);
            }
            if let Some(credential) = &server.credential {
                ice.credential(credential);
            }
            JsValue::from(ice)
        })
        .collect()
}

/// Reads the `sdp` field of a description resolved by the browser.
fn sdp_of(desc: &JsValue) -> Option<String> {
    Reflect::get(desc, &JsValue::from_str("sdp"))
        .ok()
        .and_then(|sdp| sdp.as_string())
}

fn description_init(desc: &SessionDescription) -> RtcSessionDescriptionInit {
    let kind = match desc.kind {
        SdpType::Offer => RtcSdpType::Offer,
        SdpType::Answer => RtcSdpType::Answer,
    };
    let mut init = RtcSessionDescriptionInit::new(kind);
    init.sdp(&desc.sdp);
    init
}

/// [`NegotiationEngine`] over a browser [RTCPeerConnection][1].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
pub struct RtcPeerConnection {
    /// Underlying [RTCPeerConnection][1].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
    peer: Rc<SysRtcPeerConnection>,

    /// Listener of the [icecandidate][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-icecandidate
    on_ice_candidate: RefCell<
        Option<EventListener<SysRtcPeerConnection, RtcPeerConnectionIceEvent>>,
    >,

    /// Listener of the [track][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-track
    on_track:
        RefCell<Option<EventListener<SysRtcPeerConnection, RtcTrackEvent>>>,
}

impl RtcPeerConnection {
    /// Creates a new [RTCPeerConnection][1] with the provided ICE servers,
    /// reporting its local candidates and remote tracks to the `events`.
    ///
    /// # Errors
    ///
    /// With [`NegotiationError::CreatePeer`] if the browser refuses the
    /// configuration.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
    pub fn new(
        ice_servers: &[IceServer],
        events: EngineEvents<MediaStreamTrack>,
    ) -> Result<Self> {
        let mut config = RtcConfiguration::new();
        config.ice_servers(&ice_servers_array(ice_servers));
        let peer = Rc::new(
            SysRtcPeerConnection::new_with_configuration(&config)
                .map_err(Into::into)
                .map_err(NegotiationError::CreatePeer)
                .map_err(tracerr::wrap!())?,
        );

        let candidates = events.clone();
        let on_ice_candidate = EventListener::new_mut(
            Rc::clone(&peer),
            "icecandidate",
            move |e: RtcPeerConnectionIceEvent| {
                // `None` marks the end of the gathering.
                if let Some(c) = e.candidate() {
                    candidates.ice_candidate_discovered(IceCandidate {
                        candidate: c.candidate(),
                        sdp_m_line_index: c.sdp_m_line_index(),
                        sdp_mid: c.sdp_mid(),
                    });
                }
            },
        )
        .map_err(|e| NegotiationError::CreatePeer(e.into_inner().into()))
        .map_err(tracerr::wrap!())?;

        let on_track = EventListener::new_mut(
            Rc::clone(&peer),
            "track",
            move |e: RtcTrackEvent| {
                events.remote_track_added(e.track());
            },
        )
        .map_err(|e| NegotiationError::CreatePeer(e.into_inner().into()))
        .map_err(tracerr::wrap!())?;

        Ok(Self {
            peer,
            on_ice_candidate: RefCell::new(Some(on_ice_candidate)),
            on_track: RefCell::new(Some(on_track)),
        })
    }

    async fn describe(&self, kind: SdpType) -> Result<SessionDescription> {
        let failed = |err: platform::Error| match kind {
            SdpType::Offer => NegotiationError::CreateOffer(err),
            SdpType::Answer => NegotiationError::CreateAnswer(err),
        };
        let promise = match kind {
            SdpType::Offer => self.peer.create_offer(),
            SdpType::Answer => self.peer.create_answer(),
        };
        let desc = JsFuture::from(promise)
            .await
            .map_err(platform::Error::from)
            .map_err(failed)
            .map_err(tracerr::wrap!())?;
        let sdp = sdp_of(&desc).ok_or_else(|| {
            tracerr::new!(failed(platform::Error::new(
                "TypeError",
                "description has no SDP",
            )))
        })?;

        Ok(SessionDescription { kind, sdp })
    }
}

#[async_trait(?Send)]
impl NegotiationEngine for RtcPeerConnection {
    type Tracks = BrowserTracks;

    fn add_local_tracks(&self, tracks: &BrowserTracks) -> Result<()> {
        // Called through `Reflect`, so a refused track surfaces as the thrown
        // exception.
        let add_track: Function =
            Reflect::get(&self.peer, &JsValue::from_str("addTrack"))
                .and_then(JsCast::dyn_into)
                .map_err(platform::Error::from)
                .map_err(NegotiationError::AddTracks)
                .map_err(tracerr::wrap!())?;
        for track in tracks.tracks() {
            add_track
                .call2(&self.peer, &track, tracks.stream())
                .map_err(platform::Error::from)
                .map_err(NegotiationError::AddTracks)
                .map_err(tracerr::wrap!())?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.describe(SdpType::Offer).await
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.describe(SdpType::Answer).await
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<()> {
        JsFuture::from(
            self.peer.set_local_description(&description_init(&desc)),
        )
        .await
        .map(drop)
        .map_err(Into::into)
        .map_err(NegotiationError::SetLocalDescription)
        .map_err(tracerr::wrap!())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<()> {
        JsFuture::from(
            self.peer.set_remote_description(&description_init(&desc)),
        )
        .await
        .map(drop)
        .map_err(Into::into)
        .map_err(NegotiationError::SetRemoteDescription)
        .map_err(tracerr::wrap!())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut init = RtcIceCandidateInit::new(&candidate.candidate);
        init.sdp_m_line_index(candidate.sdp_m_line_index)
            .sdp_mid(candidate.sdp_mid.as_deref());

        JsFuture::from(
            self.peer
                .add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(
                    &init,
                )),
        )
        .await
        .map(drop)
        .map_err(Into::into)
        .map_err(NegotiationError::AddIceCandidate)
        .map_err(tracerr::wrap!())
    }

    fn close(&self) {
        self.on_ice_candidate.borrow_mut().take();
        self.on_track.borrow_mut().take();
        self.peer.close();
    }
}

impl Drop for RtcPeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}
