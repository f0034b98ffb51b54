//! [MediaDevices][1] functionality.
//!
//! [1]: https://w3.org/TR/mediacapture-streams#mediadevices

use async_trait::async_trait;
use derive_more::From;
use huddle_client_api_proto::{CallKind, IceServer, MediaKind};
use tracerr::Traced;
use wasm_bindgen::{JsCast as _, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{MediaStream, MediaStreamConstraints, MediaStreamTrack};

use crate::platform::{
    self,
    media::{
        EngineEvents, LocalTracks, MediaCapability, MediaError,
        NegotiationError,
    },
    wasm::{peer_connection::RtcPeerConnection, window},
};

/// Local [MediaStream][1] acquired for a call.
///
/// [1]: https://w3.org/TR/mediacapture-streams#mediastream
#[derive(Clone, Debug, From)]
pub struct BrowserTracks(MediaStream);

impl BrowserTracks {
    /// Returns the underlying [`MediaStream`].
    #[inline]
    #[must_use]
    pub fn stream(&self) -> &MediaStream {
        &self.0
    }

    /// Returns all the [`MediaStreamTrack`]s of the stream.
    pub fn tracks(&self) -> impl Iterator<Item = MediaStreamTrack> {
        self.0
            .get_tracks()
            .iter()
            .filter_map(|t| t.dyn_into::<MediaStreamTrack>().ok())
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl LocalTracks for BrowserTracks {
    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool {
        let tracks = match kind {
            MediaKind::Audio => self.0.get_audio_tracks(),
            MediaKind::Video => self.0.get_video_tracks(),
        };
        let mut found = false;
        for track in tracks.iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                track.set_enabled(enabled);
                found = true;
            }
        }
        found
    }

    fn stop(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// [`MediaCapability`] backed by [getUserMedia()][1] and
/// [RTCPeerConnection][2].
///
/// [1]: https://w3.org/TR/mediacapture-streams#dom-mediadevices-getusermedia
/// [2]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserMedia;

/// Maps an error of [getUserMedia()][1] to a [`MediaError`] by its name.
///
/// [1]: https://w3.org/TR/mediacapture-streams#dom-mediadevices-getusermedia
fn media_error(err: JsValue) -> MediaError {
    let err = platform::Error::from(err);
    match err.name.as_ref() {
        "NotAllowedError" | "SecurityError" => {
            MediaError::PermissionDenied(err)
        }
        "NotFoundError" | "OverconstrainedError" => MediaError::NoDevice(err),
        _ => MediaError::Other(err),
    }
}

#[async_trait(?Send)]
impl MediaCapability for BrowserMedia {
    type Tracks = BrowserTracks;
    type RemoteTrack = MediaStreamTrack;
    type Engine = RtcPeerConnection;

    async fn acquire_local_media(
        &self,
        kind: CallKind,
    ) -> Result<BrowserTracks, Traced<MediaError>> {
        let media_devices = window()
            .and_then(|w| w.navigator().media_devices().map_err(Into::into))
            .map_err(MediaError::Other)
            .map_err(tracerr::wrap!())?;

        let mut caps = MediaStreamConstraints::new();
        caps.audio(&JsValue::from_bool(true))
            .video(&JsValue::from_bool(kind.includes(MediaKind::Video)));

        let stream = JsFuture::from(
            media_devices
                .get_user_media_with_constraints(&caps)
                .map_err(media_error)
                .map_err(tracerr::wrap!())?,
        )
        .await
        .map(MediaStream::from)
        .map_err(media_error)
        .map_err(tracerr::wrap!())?;
        log::debug!("Acquired local media for {} call", kind);

        Ok(stream.into())
    }

    fn create_negotiation_engine(
        &self,
        ice_servers: &[IceServer],
        events: EngineEvents<MediaStreamTrack>,
    ) -> Result<RtcPeerConnection, Traced<NegotiationError>> {
        RtcPeerConnection::new(ice_servers, events)
    }
}
