//! Credentials provider implementations.

pub mod env;
pub mod profile;

#[cfg(feature = "mock")]
pub mod mock;
