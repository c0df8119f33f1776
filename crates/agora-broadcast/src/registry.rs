//! Room registry: which subscribers watch which room.
//!
//! One lock guards the whole map and is held only for the map update
//! itself. Fan-out works on [`snapshot`](RoomRegistry::snapshot) copies,
//! so no network I/O ever happens under the lock.

use std::collections::{BTreeMap, HashMap};

use agora_protocol::RoomId;
use tokio::sync::Mutex;

use crate::{SubscriberHandle, SubscriberId};

/// Maps each room to the subscribers currently registered for it.
///
/// Rooms whose last subscriber leaves are pruned, so an absent room and
/// an empty room look the same to callers. Nothing here can fail: an
/// unknown room simply has no subscribers.
#[derive(Default)]
pub struct RoomRegistry {
    /// `BTreeMap` keeps each room's subscribers in ID order, so
    /// snapshots are deterministic.
    rooms: Mutex<HashMap<RoomId, BTreeMap<SubscriberId, SubscriberHandle>>>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to its room, creating the room entry if needed.
    ///
    /// Registering the same handle twice leaves it present once. A handle
    /// that is already dead is not inserted; returns whether it was.
    pub async fn register(&self, handle: SubscriberHandle) -> bool {
        if !handle.is_alive() {
            tracing::debug!(
                subscriber_id = %handle.id(),
                "not registering dead subscriber"
            );
            return false;
        }

        let room_id = handle.room_id();
        let subscriber_id = handle.id();
        let count = {
            let mut rooms = self.rooms.lock().await;
            let subscribers = rooms.entry(room_id).or_default();
            subscribers.insert(subscriber_id, handle);
            subscribers.len()
        };

        tracing::info!(
            %room_id,
            %subscriber_id,
            subscribers = count,
            "subscriber registered"
        );
        true
    }

    /// Removes a subscriber from a room.
    ///
    /// A no-op if it is already gone, so racing teardown paths can both
    /// call this. Returns whether anything was removed.
    pub async fn deregister(
        &self,
        room_id: RoomId,
        subscriber_id: SubscriberId,
    ) -> bool {
        let remaining = {
            let mut rooms = self.rooms.lock().await;
            let Some(subscribers) = rooms.get_mut(&room_id) else {
                return false;
            };
            if subscribers.remove(&subscriber_id).is_none() {
                return false;
            }
            let remaining = subscribers.len();
            if remaining == 0 {
                rooms.remove(&room_id);
            }
            remaining
        };

        tracing::info!(
            %room_id,
            %subscriber_id,
            subscribers = remaining,
            "subscriber deregistered"
        );
        true
    }

    /// Returns a copy of a room's subscribers, ordered by ID.
    pub async fn snapshot(&self, room_id: RoomId) -> Vec<SubscriberHandle> {
        self.rooms
            .lock()
            .await
            .get(&room_id)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns whether a subscriber is registered under a room.
    pub async fn contains(
        &self,
        room_id: RoomId,
        subscriber_id: SubscriberId,
    ) -> bool {
        self.rooms
            .lock()
            .await
            .get(&room_id)
            .is_some_and(|subscribers| subscribers.contains_key(&subscriber_id))
    }

    /// Number of subscribers in one room.
    pub async fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.rooms
            .lock()
            .await
            .get(&room_id)
            .map_or(0, BTreeMap::len)
    }

    /// Number of rooms with at least one subscriber.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Number of subscribers across all rooms.
    pub async fn total_subscribers(&self) -> usize {
        self.rooms.lock().await.values().map(BTreeMap::len).sum()
    }
}
