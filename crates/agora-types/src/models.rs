use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque room identifier. Rooms come into existence with their first
/// message and are only removed by an administrative delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stored chat message. Ids are opaque strings, unique within a room;
/// timestamps are integer milliseconds and not globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub timestamp: i64,
}

impl Message {
    /// Check the record against the message schema. Used on the read side
    /// of the store boundary, where failing rows are skipped rather than
    /// failing the whole page.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        validate_shape(&self.text, self.sender, self.timestamp)
    }
}

/// Write-side message shape. The store assigns the id on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub text: String,
    pub sender: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub timestamp: i64,
}

impl MessageDraft {
    pub fn new(text: impl Into<String>, sender: i64, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            sender,
            role: None,
            timestamp,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Validate before any store call. Invalid drafts never reach storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_shape(&self.text, self.sender, self.timestamp)
    }
}

fn validate_shape(text: &str, sender: i64, timestamp: i64) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if sender <= 0 {
        return Err(ValidationError::InvalidSender(sender));
    }
    if timestamp < 0 {
        return Err(ValidationError::NegativeTimestamp(timestamp));
    }
    Ok(())
}

/// Room summary for the room-list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub message_count: u64,
    pub newest_timestamp: Option<i64>,
}
