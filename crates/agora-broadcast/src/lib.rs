//! Room event broadcaster for Agora.
//!
//! Tracks which live connections watch which room and fans room events
//! out to exactly those connections.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: room → subscribers, snapshot-then-release
//! - [`EventPublisher`]: encodes a [`DomainEvent`](agora_protocol::DomainEvent)
//!   once and dispatches it to every subscriber of its room
//! - [`SubscriberHandle`]: the registry's view of one connection:
//!   bounded send, cancellation token, liveness flag
//! - [`SubscriberConnection`]: owns the transport and its reader/writer tasks
//! - [`Subscription`]: drives one connection from registration to close
//! - [`SubscriptionState`]: lifecycle state machine

mod config;
mod error;
mod lifecycle;
mod publisher;
mod registry;
mod subscriber;

pub use config::{BroadcastConfig, duration_ms};
pub use error::BroadcastError;
pub use lifecycle::{Lifecycle, Subscription, SubscriptionState};
pub use publisher::EventPublisher;
pub use registry::RoomRegistry;
pub use subscriber::{Frame, SubscriberConnection, SubscriberHandle, SubscriberId};
