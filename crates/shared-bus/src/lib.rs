//! # Shared Bus - Publish/Subscribe Transport
//!
//! The transport the gateway hands change events to. Publishers send one
//! publication per event; every subscriber of the topic receives it and
//! decides locally whether to forward it to its client.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐   subscribe()   ┌──────────────┐
//! │  Dispatcher  │ ────────────► │  PubSub      │ ──────────────► │ Push session │
//! │  (gateway)   │               │  transport   │ ──────────────► │ Push session │
//! └──────────────┘               └──────────────┘                 └──────────────┘
//! ```
//!
//! Payloads are opaque JSON; the bus never inspects them.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod publication;
pub mod publisher;
pub mod subscriber;

pub use publication::{BusError, Publication};
pub use publisher::{InMemoryPubSub, PubSubServer};
pub use subscriber::Subscription;

/// Publications buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
