//! Settings of calls negotiated in a [`Room`].
//!
//! [`Room`]: crate::room::Room

use std::time::Duration;

use derive_more::Display;
use huddle_client_api_proto::IceServer;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracerr::Traced;

use crate::utils::{ErrorName, JsonParseError};

/// Public STUN server used when the embedding page provides none.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Settings of calls, provided by the embedding page as JSON.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct CallSettings {
    /// [ICE servers][1] handed to every negotiation engine. Defaults to a
    /// single public STUN server.
    ///
    /// [1]: https://webrtcglossary.com/ice#ice-server
    #[default(vec![IceServer {
        urls: vec![DEFAULT_STUN_SERVER.to_owned()],
        username: None,
        credential: None,
    }])]
    pub ice_servers: Vec<IceServer>,

    /// Maximum time to wait for the signalling connection to open. Defaults
    /// to `10s`.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl CallSettings {
    /// Parses [`CallSettings`] from the provided JSON, falling back to
    /// defaults for every omitted field.
    ///
    /// # Errors
    ///
    /// With [`ConfError::Parse`] if the provided JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, Traced<ConfError>> {
        serde_json::from_str(json)
            .map_err(JsonParseError::from)
            .map_err(ConfError::Parse)
            .map_err(tracerr::wrap!())
    }
}

/// Errors of parsing [`CallSettings`].
#[derive(Clone, Debug, Display, PartialEq)]
pub enum ConfError {
    /// Provided settings are not valid JSON of [`CallSettings`].
    #[display(fmt = "Failed to parse call settings: {}", _0)]
    Parse(JsonParseError),
}

impl ErrorName for ConfError {
    fn name(&self) -> &'static str {
        match self {
            Self::Parse(_) => "Parse",
        }
    }
}
