//! App error exported to JS side.

use std::fmt::Display;

use derive_more::Display;
use tracerr::{Trace, Traced};
use wasm_bindgen::prelude::*;

use crate::utils::ErrorName;

/// Representation of an app error exported to JS side.
#[wasm_bindgen]
#[derive(Clone, Debug, Display)]
#[display(fmt = "{}: {}\n{}", name, message, trace)]
pub struct HuddleError {
    name: &'static str,
    message: String,
    trace: Trace,
}

#[wasm_bindgen]
impl HuddleError {
    /// Returns name of the error.
    pub fn name(&self) -> String {
        String::from(self.name)
    }

    /// Returns message of the error.
    pub fn message(&self) -> String {
        self.message.clone()
    }

    /// Returns trace information of the error.
    pub fn trace(&self) -> String {
        self.trace.to_string()
    }
}

impl<E: ErrorName + Display> From<(E, Trace)> for HuddleError {
    #[inline]
    fn from((err, trace): (E, Trace)) -> Self {
        Self {
            name: err.name(),
            message: err.to_string(),
            trace,
        }
    }
}

impl<E: ErrorName + Display> From<Traced<E>> for HuddleError {
    #[inline]
    fn from(traced: Traced<E>) -> Self {
        Self::from(traced.into_parts())
    }
}
