use derive_more::{From, Into};
use js_sys::{Array, Promise};
use wasm_bindgen::{prelude::*, JsValue};
use wasm_bindgen_futures::future_to_promise;

use crate::{
    api::{CallType, HuddleError},
    platform::BrowserMedia,
    proto::{MediaKind, MessageId},
    room,
};

/// JS side handle of a joined room.
///
/// Actually, represents a [`Weak`]-based handle to the room, so it stops
/// working once the room is closed.
///
/// [`Weak`]: std::rc::Weak
#[wasm_bindgen]
#[derive(Clone, From, Into)]
pub struct RoomHandle(room::RoomHandle<BrowserMedia>);

#[wasm_bindgen]
impl RoomHandle {
    /// Returns ID of the local participant.
    pub fn local_user(&self) -> Result<String, JsValue> {
        self.0
            .local_user()
            .map(|u| u.0)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Returns IDs of the participants currently in the room.
    pub fn online(&self) -> Result<Array, JsValue> {
        let online = self.0.online().map_err(HuddleError::from)?;
        Ok(online.into_iter().map(|u| JsValue::from(u.0)).collect())
    }

    /// Returns status of the call (`idle` if there is none).
    pub fn call_status(&self) -> Result<String, JsValue> {
        self.0
            .call_status()
            .map(|s| s.to_string())
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Returns ID of the peer of the call, if there is one.
    pub fn call_peer(&self) -> Result<Option<String>, JsValue> {
        self.0
            .call_peer()
            .map(|p| p.map(|p| p.0))
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Posts a chat message.
    pub fn send_message(&self, content: String) -> Result<(), JsValue> {
        self.0
            .send_message(content)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Reacts to the chat message with the provided `emoji`.
    pub fn add_reaction(
        &self,
        message_id: String,
        emoji: String,
    ) -> Result<(), JsValue> {
        self.0
            .add_reaction(MessageId(message_id), emoji)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Withdraws the reaction to the chat message with the provided `emoji`.
    pub fn remove_reaction(
        &self,
        message_id: String,
        emoji: String,
    ) -> Result<(), JsValue> {
        self.0
            .remove_reaction(MessageId(message_id), emoji)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Calls the provided participant.
    ///
    /// Effectively returns `Result<(), HuddleError>`, resolved once the offer
    /// is sent.
    pub fn start_call(&self, peer: String, call_type: CallType) -> Promise {
        let this = self.0.clone();

        future_to_promise(async move {
            this.start_call(peer.into(), call_type.into())
                .await
                .map_err(HuddleError::from)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Accepts the incoming call.
    ///
    /// Effectively returns `Result<(), HuddleError>`, resolved once the
    /// answer is sent.
    pub fn accept_call(&self) -> Promise {
        let this = self.0.clone();

        future_to_promise(async move {
            this.accept_call().await.map_err(HuddleError::from)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Rejects the incoming call.
    pub fn reject_call(&self) -> Result<(), JsValue> {
        self.0
            .reject_call()
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Hangs up the call, releasing the camera and the microphone.
    pub fn end_call(&self) -> Result<(), JsValue> {
        self.0
            .end_call()
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Mutes or unmutes the microphone of the call.
    pub fn set_audio_muted(&self, muted: bool) -> Result<(), JsValue> {
        self.0
            .set_muted(MediaKind::Audio, muted)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }

    /// Mutes or unmutes the camera of the call.
    pub fn set_video_muted(&self, muted: bool) -> Result<(), JsValue> {
        self.0
            .set_muted(MediaKind::Video, muted)
            .map_err(HuddleError::from)
            .map_err(JsValue::from)
    }
}
