//! Browser implementations of the platform interfaces.

pub mod media_devices;
pub mod peer_connection;
pub mod transport;
pub mod utils;

use std::{borrow::Cow, convert::TryFrom as _, time::Duration};

use futures::Future;
use js_sys::Promise;
use wasm_bindgen::{JsCast as _, JsValue};
use wasm_bindgen_futures::JsFuture;

use crate::platform;

/// Sets up [`console_error_panic_hook`], so panics are printed to the
/// browser console.
///
/// Does nothing without the `console_error_panic_hook` feature.
#[inline]
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Initializes [`wasm_logger`] as the application logger with the minimal
/// [`log::Level::Debug`].
pub fn init_logger() {
    wasm_logger::init(wasm_logger::Config::new(log::Level::Debug));
}

/// Runs a Rust [`Future`] on the current thread.
#[inline]
pub fn spawn<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(task);
}

/// [`Future`] resolving after the provided [`Duration`].
///
/// Resolves right away if there is no [Window][1].
///
/// [1]: https://developer.mozilla.org/en-US/docs/Web/API/Window
pub async fn delay_for(delay: Duration) {
    let delay_ms = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    let window = if let Some(window) = web_sys::window() {
        window
    } else {
        log::error!("There is no Window to set a timeout on");
        return;
    };

    let promise = Promise::new(&mut |resolve, _| {
        if let Err(e) = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                &resolve, delay_ms,
            )
        {
            log::error!("Failed to set timeout: {}", platform::Error::from(e));
        }
    });
    let _ = JsFuture::from(promise).await;
}

/// Returns the [Window][1] of the page.
///
/// # Errors
///
/// With [`platform::Error`] if there is no [Window][1] (in a worker).
///
/// [1]: https://developer.mozilla.org/en-US/docs/Web/API/Window
pub fn window() -> Result<web_sys::Window, platform::Error> {
    web_sys::window().ok_or_else(|| {
        platform::Error::new("NoWindow", "Window is not available")
    })
}

impl From<JsValue> for platform::Error {
    fn from(val: JsValue) -> Self {
        if let Some(e) = val.dyn_ref::<web_sys::DomException>() {
            return Self::new(e.name(), e.message());
        }
        match val.dyn_into::<js_sys::Error>() {
            Ok(e) => {
                Self::new(String::from(e.name()), String::from(e.message()))
            }
            Err(val) => Self::new(
                "Error",
                val.as_string().map_or_else(
                    || Cow::Borrowed("no string representation"),
                    Cow::Owned,
                ),
            ),
        }
    }
}
