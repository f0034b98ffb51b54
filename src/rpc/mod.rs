//! Addressing of the signalling connection and its closing reasons.

use std::str::FromStr;

use derive_more::Display;
use huddle_client_api_proto::{RoomId, UserId};
use tracerr::Traced;
use url::Url;

use crate::utils::ErrorName;

/// Connection with remote was closed.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum CloseMsg {
    /// Transport was gracefully closed by remote.
    ///
    /// Determines by close code `1000` and existence of a reason.
    #[display(fmt = "Normal({}, {})", _0, _1)]
    Normal(u16, String),

    /// Connection was unexpectedly closed. Consider reconnecting.
    ///
    /// Unexpected close determines by close code != `1000`.
    #[display(fmt = "Abnormal({})", _0)]
    Abnormal(u16),
}

impl CloseMsg {
    /// Classifies a close frame by its `code` and `reason`.
    #[must_use]
    pub fn new(code: u16, reason: String) -> Self {
        if code == 1000 {
            Self::Normal(code, reason)
        } else {
            Self::Abnormal(code)
        }
    }
}

/// Errors of building a [`ConnectionInfo`].
#[derive(Clone, Debug, Display, PartialEq)]
pub enum ConnectionInfoParseError {
    /// Provided base URL is not a valid URL.
    #[display(fmt = "Failed to parse provided URL: {}", _0)]
    UrlParse(url::ParseError),

    /// Provided base URL uses a scheme other than `ws` or `wss`.
    #[display(fmt = "Signalling requires ws:// or wss:// URL, got {}://", _0)]
    UnsupportedScheme(String),

    /// Provided base URL cannot be a base of a path.
    #[display(fmt = "Provided URL cannot be a base")]
    NotBase,
}

impl ErrorName for ConnectionInfoParseError {
    fn name(&self) -> &'static str {
        match self {
            Self::UrlParse(_) => "UrlParse",
            Self::UnsupportedScheme(_) => "UnsupportedScheme",
            Self::NotBase => "NotBase",
        }
    }
}

/// Address of the signalling connection of one participant of one room.
///
/// Rendered as `{base}/ws/{room}/{user}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionInfo {
    /// Base URL of the room server, without the `/ws/...` suffix.
    base: Url,

    /// ID of the joined room.
    room_id: RoomId,

    /// ID the local participant joins with.
    user_id: UserId,
}

impl ConnectionInfo {
    /// Builds a new [`ConnectionInfo`] from the server `base` URL.
    ///
    /// # Errors
    ///
    /// If `base` is not a valid `ws://` or `wss://` URL.
    pub fn new(
        base: &str,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Self, Traced<ConnectionInfoParseError>> {
        let base = Url::from_str(base).map_err(|e| {
            tracerr::new!(ConnectionInfoParseError::UrlParse(e))
        })?;
        match base.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(tracerr::new!(
                    ConnectionInfoParseError::UnsupportedScheme(
                        other.to_owned()
                    )
                ))
            }
        }
        if base.cannot_be_a_base() {
            return Err(tracerr::new!(ConnectionInfoParseError::NotBase));
        }

        Ok(Self {
            base,
            room_id,
            user_id,
        })
    }

    /// Returns ID of the joined room.
    #[inline]
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Returns ID of the local participant.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the full URL of the signalling WebSocket.
    #[must_use]
    pub fn url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(&[
                "ws",
                self.room_id.0.as_str(),
                self.user_id.0.as_str(),
            ]);
        }
        url
    }
}
