//! Delegated token models.

pub mod credential;
pub mod secret;
