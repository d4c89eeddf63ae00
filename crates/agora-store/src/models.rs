//! Database row types — these map directly to SQLite rows.
//! Distinct from the agora-types API models to keep the DB layer
//! independent.

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender: i64,
    pub role: Option<String>,
    pub text: String,
    pub timestamp: i64,
}

pub struct RoomRow {
    pub room_id: String,
    pub message_count: i64,
    pub newest_timestamp: Option<i64>,
}
