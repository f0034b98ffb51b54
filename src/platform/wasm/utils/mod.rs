mod event_listener;

#[doc(inline)]
pub use self::event_listener::{EventListener, EventListenerBindError};
