use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room_id     TEXT NOT NULL,
            sender      INTEGER NOT NULL,
            role        TEXT,
            text        TEXT NOT NULL,
            timestamp   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room_ts
            ON messages(room_id, timestamp);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
