//! Wire protocol for Agora.
//!
//! This crate defines what travels between the Q&A service and the
//! clients watching a room:
//!
//! - **Identifiers** ([`RoomId`], [`MessageId`]): UUID newtypes used as
//!   keys everywhere else.
//! - **Records** ([`Room`], [`Message`]): the persisted shapes handed
//!   out by the store.
//! - **Events** ([`RoomEvent`], [`DomainEvent`]): room state changes
//!   that get fanned out to subscribers.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events become bytes.
//!
//! ```text
//! Store (records) → Protocol (DomainEvent) → Broadcast (frames)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{DomainEvent, Message, MessageId, Room, RoomEvent, RoomId};
