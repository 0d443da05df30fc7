//! Shared primitives for the marketplace client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
