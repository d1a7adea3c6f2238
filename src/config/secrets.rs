//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for connection strings, so callers
//! can `expose_secret()` without a direct secrecy dependency.

pub use secrecy::{ExposeSecret, SecretString};
