#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod chat;
pub mod coordinator;
pub mod entities;
pub mod events;
pub mod join;
pub mod store;
pub mod tier_gate;
pub mod utils;
