//! The storage trait consumed by request handlers.

use std::future::Future;

use agora_protocol::{Message, MessageId, Room, RoomId};

use crate::StoreError;

/// Create/read/update access to rooms and their messages.
///
/// Every mutating method returns the record *as persisted*, which is
/// what producers put into the domain event they publish afterwards.
///
/// The futures are `Send` because handlers run on spawned tasks.
pub trait RoomStore: Send + Sync + 'static {
    /// Creates a room and returns it with its freshly assigned ID.
    fn create_room(
        &self,
        name: &str,
        theme: &str,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Looks up a room.
    ///
    /// # Errors
    /// [`StoreError::RoomNotFound`] if the room does not exist.
    fn get_room(
        &self,
        id: RoomId,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Lists rooms in creation order.
    fn list_rooms(
        &self,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<Room>, StoreError>> + Send;

    /// Posts a new question to a room.
    fn create_message(
        &self,
        room_id: RoomId,
        text: &str,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Looks up a message.
    fn get_message(
        &self,
        id: MessageId,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Lists a room's messages in posting order.
    fn list_messages(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Increments the reaction count and returns the updated message.
    fn add_reaction(
        &self,
        id: MessageId,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Decrements the reaction count, never below zero.
    fn remove_reaction(
        &self,
        id: MessageId,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Marks the message answered.
    fn mark_answered(
        &self,
        id: MessageId,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;
}
