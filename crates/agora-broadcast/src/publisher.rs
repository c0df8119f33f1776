//! Fan-out of domain events to the subscribers of one room.

use std::sync::Arc;

use agora_protocol::{Codec, DomainEvent, JsonCodec};

use crate::{Frame, RoomRegistry, SubscriberHandle};

/// Dispatches [`DomainEvent`]s to every live subscriber of their room.
///
/// Publishing never fails from the caller's point of view. Each event is
/// encoded once, then queued on every subscriber in a snapshot of the
/// room taken at call time. A subscriber whose queue is full or closed is
/// evicted and its removal from the registry runs in the background; the
/// rest still get the event.
///
/// Queueing is synchronous and in call order, so two events published
/// one after the other reach each subscriber in that same order.
pub struct EventPublisher<C: Codec = JsonCodec> {
    registry: Arc<RoomRegistry>,
    codec: C,
}

impl EventPublisher<JsonCodec> {
    /// Creates a publisher that sends JSON frames.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self::with_codec(registry, JsonCodec)
    }
}

impl<C: Codec> EventPublisher<C> {
    /// Creates a publisher with a custom wire codec.
    pub fn with_codec(registry: Arc<RoomRegistry>, codec: C) -> Self {
        Self { registry, codec }
    }

    /// The registry this publisher reads subscribers from.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Sends `event` to every subscriber of its room.
    ///
    /// Returns how many subscribers accepted the frame. A room with no
    /// subscribers returns 0 without encoding anything.
    pub async fn publish(&self, event: DomainEvent) -> usize {
        let room_id = event.room_id;
        let subscribers = self.registry.snapshot(room_id).await;
        if subscribers.is_empty() {
            tracing::trace!(%room_id, kind = event.event.kind(), "no subscribers");
            return 0;
        }

        let frame: Frame = match self.codec.encode(&event.event) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                tracing::error!(
                    %room_id,
                    kind = event.event.kind(),
                    error = %e,
                    "failed to encode event"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed: Vec<SubscriberHandle> = Vec::new();
        for handle in subscribers {
            match handle.send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        %room_id,
                        subscriber_id = %handle.id(),
                        error = %e,
                        "dropping subscriber"
                    );
                    failed.push(handle);
                }
            }
        }

        for handle in failed {
            handle.evict();
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                registry.deregister(room_id, handle.id()).await;
            });
        }

        tracing::debug!(
            %room_id,
            kind = event.event.kind(),
            message_id = %event.event.message_id(),
            delivered,
            "event published"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use agora_protocol::{MessageId, RoomEvent, RoomId};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    async fn subscribe(
        registry: &RoomRegistry,
        room_id: RoomId,
        capacity: usize,
    ) -> (SubscriberHandle, mpsc::Receiver<Frame>) {
        let (handle, rx) =
            SubscriberHandle::channel(room_id, capacity, CancellationToken::new());
        registry.register(handle.clone()).await;
        (handle, rx)
    }

    fn answered(room_id: RoomId, message_id: MessageId) -> DomainEvent {
        DomainEvent::new(room_id, RoomEvent::MessageAnswered { message_id })
    }

    #[tokio::test]
    async fn test_publish_to_empty_room_is_noop() {
        let registry = Arc::new(RoomRegistry::new());
        let publisher = EventPublisher::new(Arc::clone(&registry));

        let n = publisher.publish(answered(RoomId::new(), MessageId::new())).await;
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_once() {
        let registry = Arc::new(RoomRegistry::new());
        let publisher = EventPublisher::new(Arc::clone(&registry));
        let room = RoomId::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            receivers.push(subscribe(&registry, room, 4).await.1);
        }

        let message_id = MessageId::new();
        assert_eq!(publisher.publish(answered(room, message_id)).await, 3);

        let expected = format!(r#"{{"type":"answered","message_id":"{message_id}"}}"#);
        for rx in &mut receivers {
            let frame = rx.recv().await.unwrap();
            assert_eq!(std::str::from_utf8(&frame).unwrap(), expected);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_full_subscriber_is_evicted_and_others_still_receive() {
        let registry = Arc::new(RoomRegistry::new());
        let publisher = EventPublisher::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (slow, _slow_rx) = subscribe(&registry, room, 1).await;
        let (_fast, mut fast_rx) = subscribe(&registry, room, 8).await;

        assert_eq!(publisher.publish(answered(room, MessageId::new())).await, 2);
        // `slow` never drains, so the second event overflows its queue.
        assert_eq!(publisher.publish(answered(room, MessageId::new())).await, 1);

        assert!(!slow.is_alive());
        assert!(slow.cancel_token().is_cancelled());

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while registry.contains(room, slow.id()).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("evicted subscriber was never deregistered");
        assert_eq!(registry.subscriber_count(room).await, 1);

        assert!(fast_rx.recv().await.is_some());
        assert!(fast_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_publish_only_reaches_the_event_room() {
        let registry = Arc::new(RoomRegistry::new());
        let publisher = EventPublisher::new(Arc::clone(&registry));
        let r1 = RoomId::new();
        let r2 = RoomId::new();
        let (_a, mut rx1) = subscribe(&registry, r1, 4).await;
        let (_b, mut rx2) = subscribe(&registry, r2, 4).await;

        publisher.publish(answered(r1, MessageId::new())).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
