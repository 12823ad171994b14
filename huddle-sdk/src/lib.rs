//! Huddle SDK
//!
//! Wire objects shared between the Huddle server and its clients, session
//! token signing, and the retry helpers used by the real-time client.

pub mod objects;
pub mod retry;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
