//! Core protocol types: identifiers, persisted records, and room events.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a room.
///
/// Newtype over a v4 UUID so a `MessageId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps the wire form a
/// plain UUID string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Generates a fresh random room ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a room ID from its textual form (e.g. a URL path segment).
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidId`] if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId {
                kind: "room",
                raw: raw.to_string(),
            })
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a message (a question posted to a room).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generates a fresh random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a message ID from its textual form.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidId`] if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId {
                kind: "message",
                raw: raw.to_string(),
            })
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A Q&A room as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub theme: String,
}

/// A question posted to a room, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    /// The question text.
    pub message: String,
    pub reaction_count: u64,
    pub answered: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A room state change, in the shape subscribers receive it.
///
/// Internally tagged by `type`, so an answered message goes out as
/// `{"type":"answered","message_id":"…"}`. The room is implied by the
/// subscription and is not repeated on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A new question was posted.
    MessageCreated {
        message_id: MessageId,
        message: String,
    },

    /// Someone reacted to a question. `count` is the new total.
    ReactionAdded { message_id: MessageId, count: u64 },

    /// A reaction was withdrawn. `count` is the new total.
    ReactionRemoved { message_id: MessageId, count: u64 },

    /// The question was marked answered.
    #[serde(rename = "answered")]
    MessageAnswered { message_id: MessageId },
}

impl RoomEvent {
    /// The message this event is about.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::MessageCreated { message_id, .. }
            | Self::ReactionAdded { message_id, .. }
            | Self::ReactionRemoved { message_id, .. }
            | Self::MessageAnswered { message_id } => *message_id,
        }
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message_created",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
            Self::MessageAnswered { .. } => "answered",
        }
    }
}

/// A [`RoomEvent`] tagged with the room whose subscribers should see it.
///
/// Producers build these from the record the store just returned, so the
/// payload always reflects persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub room_id: RoomId,
    pub event: RoomEvent,
}

impl DomainEvent {
    pub fn new(room_id: RoomId, event: RoomEvent) -> Self {
        Self { room_id, event }
    }

    pub fn message_created(message: &Message) -> Self {
        Self::new(
            message.room_id,
            RoomEvent::MessageCreated {
                message_id: message.id,
                message: message.message.clone(),
            },
        )
    }

    pub fn reaction_added(message: &Message) -> Self {
        Self::new(
            message.room_id,
            RoomEvent::ReactionAdded {
                message_id: message.id,
                count: message.reaction_count,
            },
        )
    }

    pub fn reaction_removed(message: &Message) -> Self {
        Self::new(
            message.room_id,
            RoomEvent::ReactionRemoved {
                message_id: message.id,
                count: message.reaction_count,
            },
        )
    }

    pub fn message_answered(message: &Message) -> Self {
        Self::new(
            message.room_id,
            RoomEvent::MessageAnswered {
                message_id: message.id,
            },
        )
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The browser client switches on `type`, so these pin the exact JSON
    //! shape of every event.

    use super::*;
    use serde_json::json;

    fn sample_message() -> Message {
        Message {
            id: MessageId::new(),
            room_id: RoomId::new(),
            message: "what is a lifetime?".into(),
            reaction_count: 3,
            answered: false,
        }
    }

    #[test]
    fn test_room_id_serializes_as_plain_uuid_string() {
        let id = RoomId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, json!(id.0.to_string()));
    }

    #[test]
    fn test_room_id_parse_roundtrips_display() {
        let id = RoomId::new();
        assert_eq!(RoomId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_room_id_parse_rejects_malformed_input() {
        let err = RoomId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidId { kind: "room", .. }
        ));
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_message_id_parse_rejects_empty() {
        assert!(MessageId::parse("").is_err());
    }

    #[test]
    fn test_answered_event_json_format() {
        let message = sample_message();
        let event = DomainEvent::message_answered(&message);
        let json = serde_json::to_value(&event.event).unwrap();

        assert_eq!(
            json,
            json!({ "type": "answered", "message_id": message.id.to_string() })
        );
    }

    #[test]
    fn test_message_created_event_carries_text() {
        let message = sample_message();
        let event = DomainEvent::message_created(&message);
        let json = serde_json::to_value(&event.event).unwrap();

        assert_eq!(json["type"], "message_created");
        assert_eq!(json["message"], "what is a lifetime?");
        assert_eq!(event.room_id, message.room_id);
    }

    #[test]
    fn test_reaction_events_carry_current_count() {
        let message = sample_message();

        let added = serde_json::to_value(
            &DomainEvent::reaction_added(&message).event,
        )
        .unwrap();
        assert_eq!(added["type"], "reaction_added");
        assert_eq!(added["count"], 3);

        let removed = serde_json::to_value(
            &DomainEvent::reaction_removed(&message).event,
        )
        .unwrap();
        assert_eq!(removed["type"], "reaction_removed");
        assert_eq!(removed["count"], 3);
    }

    #[test]
    fn test_room_event_message_id_and_kind() {
        let id = MessageId::new();
        let event = RoomEvent::ReactionRemoved {
            message_id: id,
            count: 0,
        };
        assert_eq!(event.message_id(), id);
        assert_eq!(event.kind(), "reaction_removed");
    }

    #[test]
    fn test_message_record_json_field_names() {
        let message = sample_message();
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("room_id").is_some());
        assert!(json.get("reaction_count").is_some());
        assert_eq!(json["answered"], false);
    }
}
