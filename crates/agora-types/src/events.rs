use serde::{Deserialize, Serialize};

use crate::models::{Message, RoomId};

/// Events fanned out by the message store. Also the wire format on the
/// WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A message was written to a room
    MessageCreated { room_id: RoomId, message: Message },

    /// A room received its first message
    RoomCreated { room_id: RoomId },

    /// A room's entire message collection was removed
    RoomDeleted { room_id: RoomId },
}

impl StoreEvent {
    /// The room this event is scoped to.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::MessageCreated { room_id, .. } => room_id,
            Self::RoomCreated { room_id } => room_id,
            Self::RoomDeleted { room_id } => room_id,
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Replace the set of rooms this connection receives message events for.
    /// Room-list events (created/deleted) are always delivered.
    Subscribe { room_ids: Vec<RoomId> },
}

/// Events emitted by a feed controller to its presentation layer.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The initial page for the current room finished loading.
    InitialLoaded {
        messages: Vec<Message>,
        has_more: bool,
    },

    /// An older page was prepended. `prepended` counts messages actually
    /// merged after dedup.
    OlderLoaded { prepended: usize, has_more: bool },

    /// A live message was appended at the tail.
    Appended { message: Message },

    /// The view should scroll to the newest message.
    ScrollToBottom,

    /// No older history remains for this room.
    EndOfHistory,

    /// The controller reset for a new room.
    RoomSwitched { room_id: RoomId },

    /// Toast-style, user-visible notice.
    Notice(Notification),
}

/// A user-visible notification. All store-boundary failures surface here
/// rather than propagating into the rendering layer.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notification {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    FetchFailed,
    SubscriptionLost,
    SendFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_event_wire_format_is_tagged() {
        let event = StoreEvent::RoomDeleted {
            room_id: RoomId::new("7"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"RoomDeleted","data":{"room_id":"7"}}"#);
    }

    #[test]
    fn store_event_room_scoping() {
        let event = StoreEvent::MessageCreated {
            room_id: RoomId::new("lobby"),
            message: Message {
                id: "m1".into(),
                text: "hi".into(),
                sender: 1,
                role: None,
                timestamp: 10,
            },
        };
        assert_eq!(event.room_id().as_str(), "lobby");
    }
}
