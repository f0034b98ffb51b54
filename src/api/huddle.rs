use std::{cell::RefCell, rc::Rc};

use futures::StreamExt as _;
use js_sys::Promise;
use wasm_bindgen::{prelude::*, JsValue};
use wasm_bindgen_futures::future_to_promise;

use crate::{
    api::{event, HuddleError, RoomHandle},
    conf::CallSettings,
    platform::{
        init_logger, set_panic_hook, spawn, BrowserMedia, WebSocketChannel,
    },
    room::{self, Room},
    rpc::ConnectionInfo,
};

/// General library interface.
///
/// Responsible for joining and closing rooms.
#[wasm_bindgen]
pub struct Huddle(Rc<RefCell<Vec<Room<BrowserMedia>>>>);

#[wasm_bindgen]
impl Huddle {
    /// Instantiates a new [`Huddle`] interface to interact with this library.
    #[wasm_bindgen(constructor)]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        set_panic_hook();
        init_logger();

        Self(Rc::new(RefCell::new(Vec::new())))
    }

    /// Connects to the room server at `base_url` and joins the room
    /// `room_id` as `user_id`.
    ///
    /// `on_event` is called with every event of the room. `settings` is an
    /// optional JSON of the call settings.
    ///
    /// Effectively returns `Result<RoomHandle, HuddleError>`.
    pub fn join(
        &self,
        base_url: String,
        room_id: String,
        user_id: String,
        on_event: js_sys::Function,
        settings: Option<String>,
    ) -> Promise {
        let rooms = Rc::clone(&self.0);

        future_to_promise(async move {
            let settings = settings
                .as_deref()
                .map(CallSettings::from_json)
                .transpose()
                .map_err(HuddleError::from)?
                .unwrap_or_default();
            let info =
                ConnectionInfo::new(&base_url, room_id.into(), user_id.into())
                    .map_err(HuddleError::from)?;
            let channel =
                WebSocketChannel::connect(&info.url(), settings.connect_timeout)
                    .await
                    .map_err(HuddleError::from)?;
            log::info!("Joined room {} as {}", info.room_id(), info.user_id());

            let room = Room::new(
                info.user_id().clone(),
                Rc::new(channel),
                BrowserMedia,
                settings,
            );
            let handle = RoomHandle::from(room.new_handle());

            let mut events = room.on_event();
            spawn(async move {
                while let Some(e) = events.next().await {
                    let res = event::to_js(&e)
                        .and_then(|e| on_event.call1(&JsValue::NULL, &e));
                    if let Err(e) = res {
                        log::error!("Room event callback failed: {:?}", e);
                    }
                }
            });
            spawn(room.run());
            rooms.borrow_mut().push(room);

            Ok(JsValue::from(handle))
        })
    }

    /// Leaves the room of the provided [`RoomHandle`], hanging up its call.
    #[allow(clippy::needless_pass_by_value)]
    pub fn close_room(&self, handle: RoomHandle) {
        let handle: room::RoomHandle<BrowserMedia> = handle.into();
        self.0.borrow_mut().retain(|r| !r.owns(&handle));
    }

    /// Drops this [`Huddle`], leaving all its rooms.
    pub fn dispose(self) {
        self.0.borrow_mut().clear();
    }
}
