use std::{ops::Deref, rc::Rc};

use derive_more::{Display, From};
use tracerr::Traced;
use wasm_bindgen::{closure::Closure, convert::FromWasmAbi, JsCast as _};

use crate::{platform, utils::ErrorName};

/// Failed to bind to an [EventTarget][1] event.
///
/// [1]: https://developer.mozilla.org/en-US/docs/Web/API/EventTarget
#[derive(Clone, Debug, Display, From, PartialEq)]
pub struct EventListenerBindError(platform::Error);

impl ErrorName for EventListenerBindError {
    fn name(&self) -> &'static str {
        "EventListenerBindError"
    }
}

impl From<EventListenerBindError> for platform::Error {
    #[inline]
    fn from(err: EventListenerBindError) -> Self {
        err.0
    }
}

/// Closure handling some [`web_sys::EventTarget`] event, unbound on drop.
#[derive(Debug)]
pub struct EventListener<T, A>
where
    T: Deref<Target = web_sys::EventTarget>,
{
    event_name: &'static str,
    target: Rc<T>,
    closure: Closure<dyn FnMut(A)>,
}

impl<T, A> EventListener<T, A>
where
    T: Deref<Target = web_sys::EventTarget>,
    A: FromWasmAbi + 'static,
{
    fn bind(
        target: Rc<T>,
        event_name: &'static str,
        closure: Closure<dyn FnMut(A)>,
    ) -> Result<Self, Traced<EventListenerBindError>> {
        target
            .add_event_listener_with_callback(
                event_name,
                closure.as_ref().unchecked_ref(),
            )
            .map_err(platform::Error::from)
            .map_err(EventListenerBindError::from)
            .map_err(tracerr::wrap!())?;

        Ok(Self {
            event_name,
            target,
            closure,
        })
    }

    /// Binds the provided [`FnMut`] `closure` to the `event_name` event of
    /// the `target`.
    ///
    /// # Errors
    ///
    /// If the browser refuses to bind.
    pub fn new_mut<F>(
        target: Rc<T>,
        event_name: &'static str,
        closure: F,
    ) -> Result<Self, Traced<EventListenerBindError>>
    where
        F: FnMut(A) + 'static,
    {
        let closure = Closure::wrap(Box::new(closure) as Box<dyn FnMut(A)>);
        Self::bind(target, event_name, closure)
    }

    /// Binds the provided [`FnOnce`] `closure` to the `event_name` event of
    /// the `target`.
    ///
    /// # Errors
    ///
    /// If the browser refuses to bind.
    pub fn new_once<F>(
        target: Rc<T>,
        event_name: &'static str,
        closure: F,
    ) -> Result<Self, Traced<EventListenerBindError>>
    where
        F: FnOnce(A) + 'static,
    {
        Self::bind(target, event_name, Closure::once(closure))
    }
}

impl<T, A> Drop for EventListener<T, A>
where
    T: Deref<Target = web_sys::EventTarget>,
{
    fn drop(&mut self) {
        if let Err(err) = (self.target.as_ref() as &web_sys::EventTarget)
            .remove_event_listener_with_callback(
                self.event_name,
                self.closure.as_ref().unchecked_ref(),
            )
        {
            log::error!(
                "Failed to remove {} listener: {}",
                self.event_name,
                platform::Error::from(err),
            );
        }
    }
}
