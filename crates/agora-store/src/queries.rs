use anyhow::Result;
use rusqlite::Connection;

use crate::models::{MessageRow, RoomRow};

const MESSAGE_COLUMNS: &str = "id, room_id, sender, role, text, timestamp";

/// Most recent `limit` messages of a room, newest first. Ties on timestamp
/// break on id so page order is deterministic.
pub fn query_recent_page(conn: &Connection, room_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE room_id = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![room_id, limit], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Up to `limit` messages strictly older than `end_before`, newest first.
pub fn query_older_page(
    conn: &Connection,
    room_id: &str,
    end_before: i64,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE room_id = ?1 AND timestamp < ?2
         ORDER BY timestamp DESC, id DESC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![room_id, end_before, limit], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_message(conn: &Connection, row: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, room_id, sender, role, text, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            row.id,
            row.room_id,
            row.sender,
            row.role,
            row.text,
            row.timestamp
        ],
    )?;
    Ok(())
}

/// A room exists iff it holds at least one message.
pub fn room_exists(conn: &Connection, room_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE room_id = ?1)",
        [room_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn query_rooms(conn: &Connection) -> Result<Vec<RoomRow>> {
    let mut stmt = conn.prepare(
        "SELECT room_id, COUNT(*), MAX(timestamp) FROM messages
         GROUP BY room_id
         ORDER BY room_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RoomRow {
                room_id: row.get(0)?,
                message_count: row.get(1)?,
                newest_timestamp: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remove a room's entire message collection. Returns the number of rows
/// deleted.
pub fn delete_room_messages(conn: &Connection, room_id: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM messages WHERE room_id = ?1", [room_id])?;
    Ok(removed)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender: row.get(2)?,
        role: row.get(3)?,
        text: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
