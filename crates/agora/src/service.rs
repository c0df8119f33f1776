//! Producer side: the room and message operations request handlers call.
//!
//! Every mutation goes to the store first. Only once the store has
//! accepted it is the matching [`DomainEvent`] published, built from the
//! record the store returned. Publishing is best-effort: a subscriber
//! failing to receive never turns a successful write into an error.
//!
//! Each write and its publish happen under one lock, so events leave in
//! the order the store applied them. Two concurrent reactions can never
//! reach a watcher as `count: 2` followed by `count: 1`.

use std::sync::Arc;

use agora_broadcast::EventPublisher;
use agora_protocol::{Codec, DomainEvent, JsonCodec, Message, MessageId, Room, RoomId};
use agora_store::{RoomStore, StoreError};
use tokio::sync::Mutex;

use crate::AgoraError;

/// Room and message operations with live fan-out.
///
/// Identifiers are taken as raw strings, the way they arrive in a
/// request path, and parsed here. Cheap to clone.
pub struct RoomService<S: RoomStore, C: Codec = JsonCodec> {
    store: Arc<S>,
    publisher: Arc<EventPublisher<C>>,
    /// Held from a write until its event is queued.
    write_order: Arc<Mutex<()>>,
}

impl<S: RoomStore, C: Codec> Clone for RoomService<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: Arc::clone(&self.publisher),
            write_order: Arc::clone(&self.write_order),
        }
    }
}

impl<S: RoomStore, C: Codec> RoomService<S, C> {
    pub fn new(store: Arc<S>, publisher: Arc<EventPublisher<C>>) -> Self {
        Self {
            store,
            publisher,
            write_order: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn publisher(&self) -> &Arc<EventPublisher<C>> {
        &self.publisher
    }

    /// Creates a room. Nobody can be subscribed yet, so nothing is published.
    pub async fn create_room(&self, name: &str, theme: &str) -> Result<Room, AgoraError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgoraError::InvalidInput("room name is empty".into()));
        }
        let room = self.store.create_room(name, theme.trim()).await?;
        tracing::info!(room_id = %room.id, name = %room.name, "room created");
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, AgoraError> {
        let room_id = RoomId::parse(room_id)?;
        Ok(self.store.get_room(room_id).await?)
    }

    pub async fn list_rooms(&self, limit: usize, offset: usize) -> Result<Vec<Room>, AgoraError> {
        Ok(self.store.list_rooms(limit, offset).await?)
    }

    /// Posts a question and publishes `message_created`.
    pub async fn create_message(&self, room_id: &str, text: &str) -> Result<Message, AgoraError> {
        let room_id = RoomId::parse(room_id)?;
        if text.trim().is_empty() {
            return Err(AgoraError::InvalidInput("message is empty".into()));
        }
        let _order = self.write_order.lock().await;
        let message = self.store.create_message(room_id, text).await?;
        self.publisher.publish(DomainEvent::message_created(&message)).await;
        Ok(message)
    }

    /// Looks up a message, which must belong to `room_id`.
    pub async fn get_message(&self, room_id: &str, message_id: &str) -> Result<Message, AgoraError> {
        let (_, message) = self.message_in_room(room_id, message_id).await?;
        Ok(message)
    }

    pub async fn list_messages(&self, room_id: &str) -> Result<Vec<Message>, AgoraError> {
        let room_id = RoomId::parse(room_id)?;
        Ok(self.store.list_messages(room_id).await?)
    }

    /// Adds a reaction and publishes `reaction_added` with the new count.
    pub async fn react_to_message(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<Message, AgoraError> {
        let (id, _) = self.message_in_room(room_id, message_id).await?;
        let _order = self.write_order.lock().await;
        let message = self.store.add_reaction(id).await?;
        self.publisher.publish(DomainEvent::reaction_added(&message)).await;
        Ok(message)
    }

    /// Withdraws a reaction and publishes `reaction_removed`. The count
    /// stops at zero.
    pub async fn remove_reaction(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<Message, AgoraError> {
        let (id, _) = self.message_in_room(room_id, message_id).await?;
        let _order = self.write_order.lock().await;
        let message = self.store.remove_reaction(id).await?;
        self.publisher.publish(DomainEvent::reaction_removed(&message)).await;
        Ok(message)
    }

    /// Marks a question answered and publishes `answered`.
    pub async fn mark_answered(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<Message, AgoraError> {
        let (id, _) = self.message_in_room(room_id, message_id).await?;
        let _order = self.write_order.lock().await;
        let message = self.store.mark_answered(id).await?;
        self.publisher.publish(DomainEvent::message_answered(&message)).await;
        Ok(message)
    }

    /// A message addressed under the wrong room is reported as missing.
    async fn message_in_room(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<(MessageId, Message), AgoraError> {
        let room_id = RoomId::parse(room_id)?;
        let message_id = MessageId::parse(message_id)?;
        let message = self.store.get_message(message_id).await?;
        if message.room_id != room_id {
            return Err(StoreError::MessageNotFound(message_id).into());
        }
        Ok((message_id, message))
    }
}
