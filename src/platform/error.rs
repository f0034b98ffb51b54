use std::borrow::Cow;

use derive_more::Display;

/// Error reported by the platform (a browser API on `wasm32`).
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}: {}", name, message)]
pub struct Error {
    /// Name of the platform error (e.g. `NotAllowedError`).
    pub name: Cow<'static, str>,

    /// Message of the platform error.
    pub message: Cow<'static, str>,
}

impl Error {
    /// Creates a new [`Error`] with the provided `name` and `message`.
    pub fn new<N, M>(name: N, message: M) -> Self
    where
        N: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}
