//! In-memory [`RoomStore`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use agora_protocol::{Message, MessageId, Room, RoomId};
use tokio::sync::RwLock;

use crate::{RoomStore, StoreError};

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, Room>,
    /// Room IDs in creation order, for stable listing.
    room_order: Vec<RoomId>,
    messages: HashMap<MessageId, Message>,
    /// Message IDs per room in posting order.
    room_messages: HashMap<RoomId, Vec<MessageId>>,
}

/// A [`RoomStore`] backed by process memory.
///
/// Cheap to clone; clones share the same tables. Nothing survives a
/// restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rooms.
    pub async fn room_count(&self) -> usize {
        self.tables.read().await.rooms.len()
    }

    /// Applies `update` to a message and returns the updated copy.
    async fn update_message(
        &self,
        id: MessageId,
        update: impl FnOnce(&mut Message),
    ) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .get_mut(&id)
            .ok_or(StoreError::MessageNotFound(id))?;
        update(message);
        Ok(message.clone())
    }
}

impl RoomStore for MemoryStore {
    async fn create_room(
        &self,
        name: &str,
        theme: &str,
    ) -> Result<Room, StoreError> {
        let room = Room {
            id: RoomId::new(),
            name: name.to_string(),
            theme: theme.to_string(),
        };

        let mut tables = self.tables.write().await;
        tables.room_order.push(room.id);
        tables.rooms.insert(room.id, room.clone());

        tracing::debug!(room_id = %room.id, "room stored");
        Ok(room)
    }

    async fn get_room(&self, id: RoomId) -> Result<Room, StoreError> {
        self.tables
            .read()
            .await
            .rooms
            .get(&id)
            .cloned()
            .ok_or(StoreError::RoomNotFound(id))
    }

    async fn list_rooms(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Room>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .room_order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| tables.rooms.get(id).cloned())
            .collect())
    }

    async fn create_message(
        &self,
        room_id: RoomId,
        text: &str,
    ) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&room_id) {
            return Err(StoreError::RoomNotFound(room_id));
        }

        let message = Message {
            id: MessageId::new(),
            room_id,
            message: text.to_string(),
            reaction_count: 0,
            answered: false,
        };
        tables.messages.insert(message.id, message.clone());
        tables
            .room_messages
            .entry(room_id)
            .or_default()
            .push(message.id);

        Ok(message)
    }

    async fn get_message(&self, id: MessageId) -> Result<Message, StoreError> {
        self.tables
            .read()
            .await
            .messages
            .get(&id)
            .cloned()
            .ok_or(StoreError::MessageNotFound(id))
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.rooms.contains_key(&room_id) {
            return Err(StoreError::RoomNotFound(room_id));
        }
        Ok(tables
            .room_messages
            .get(&room_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_reaction(&self, id: MessageId) -> Result<Message, StoreError> {
        self.update_message(id, |m| m.reaction_count += 1).await
    }

    async fn remove_reaction(
        &self,
        id: MessageId,
    ) -> Result<Message, StoreError> {
        self.update_message(id, |m| {
            m.reaction_count = m.reaction_count.saturating_sub(1);
        })
        .await
    }

    async fn mark_answered(&self, id: MessageId) -> Result<Message, StoreError> {
        self.update_message(id, |m| m.answered = true).await
    }
}
