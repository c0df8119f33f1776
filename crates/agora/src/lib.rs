//! # Agora
//!
//! Live Q&A rooms with real-time updates.
//!
//! Clients watch a room by opening a WebSocket to
//! `/subscribe/{room_id}`. Request handlers change rooms through
//! [`RoomService`], which persists each change and then pushes the
//! matching event to every client watching that room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agora::prelude::*;
//!
//! # async fn start() -> Result<(), AgoraError> {
//! let server = AgoraServerBuilder::new()
//!     .bind("127.0.0.1:8080")
//!     .build(MemoryStore::new())
//!     .await?;
//!
//! let service = server.service();
//! let room = service.create_room("Rust Q&A", "async").await?;
//! println!("subscribe at /subscribe/{}", room.id);
//!
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod server;
mod service;
mod subscribe;
mod telemetry;

pub use self::config::{ENV_PREFIX, ENV_SEPARATOR, ServerConfig};
pub use error::AgoraError;
pub use server::{AgoraServer, AgoraServerBuilder};
pub use service::RoomService;
pub use subscribe::{SUBSCRIBE_ROUTE, SubscribeError, parse_room_id};
pub use telemetry::init_tracing;

/// Convenient re-exports for building a server.
///
/// ```rust
/// use agora::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AgoraError, AgoraServer, AgoraServerBuilder, RoomService, ServerConfig,
        SubscribeError, init_tracing,
    };

    pub use agora_broadcast::{BroadcastConfig, EventPublisher, RoomRegistry};
    pub use agora_protocol::{
        DomainEvent, Message, MessageId, Room, RoomEvent, RoomId,
    };
    pub use agora_store::{MemoryStore, RoomStore, StoreError};
}
