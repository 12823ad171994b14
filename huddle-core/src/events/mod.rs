//! Publish/subscribe layer between the engine and live connections.
//!
//! Components publish typed [`RealtimeEvent`]s after their state change is
//! committed. Every live connection holds a broadcast receiver and keeps only
//! the envelopes addressed to it; the transport adapts them to the wire format.
//!
//! # Event Flow
//!
//! 1. `SendMessage` emits `MessageCreated` -> the event's members
//! 2. `Typing` (and timer expiry) emits `TypingChanged` -> the event's members
//! 3. `MarkRead` emits `ReadReceipt` -> the event's other members
//! 4. `ResolveJoinRequest` emits `JoinRequestResolved` -> the requester, and on
//!    accept `MembershipGranted` so live connections pick up the new event

pub mod broker;
pub mod types;

pub use broker::{Broker, BrokerReceiver, DEFAULT_BROADCAST_CAPACITY};
pub use types::{Audience, Envelope, RealtimeEvent, TypingUser};
