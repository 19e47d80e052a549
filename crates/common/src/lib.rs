//! Types shared by the bulk document tooling crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
