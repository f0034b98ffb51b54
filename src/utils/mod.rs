//! Miscellaneous utility structs and functions.

mod errors;

#[doc(inline)]
pub use self::errors::{ErrorName, JsonParseError};
