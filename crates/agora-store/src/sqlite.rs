use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::{Message, MessageDraft, RoomId, RoomInfo, StoreError, StoreEvent};

use crate::dispatcher::Dispatcher;
use crate::models::MessageRow;
use crate::{MessageStore, RoomWatch, Subscription, migrations, queries};

/// SQLite-backed message store with realtime fan-out. Cheap to clone; all
/// clones share the connection and dispatcher.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    conn: Mutex<Connection>,
    dispatcher: Dispatcher,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;
        info!("Message store opened at {}", path.display());
        Ok(Self::from_conn(conn))
    }

    /// In-memory store, used by tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                dispatcher: Dispatcher::new(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Current room list, one entry per room holding at least one message.
    pub async fn room_list(&self) -> Result<Vec<RoomInfo>, StoreError> {
        let rows = self.run_blocking(queries::query_rooms).await?;
        Ok(rows
            .into_iter()
            .map(|row| RoomInfo {
                id: RoomId::new(row.room_id),
                message_count: row.message_count as u64,
                newest_timestamp: row.newest_timestamp,
            })
            .collect())
    }

    /// Run a query on the blocking pool; the SQLite connection must not be
    /// held across await points.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let conn = inner
                .conn
                .lock()
                .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(StoreError::Backend)
    }
}

/// Decode rows (newest first, as queried) into an ascending message list.
/// Rows failing schema validation are logged and excluded; a bad record
/// never fails the batch.
fn decode_rows(room: &RoomId, rows: Vec<MessageRow>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        let message = Message {
            id: row.id,
            text: row.text,
            sender: row.sender,
            role: row.role,
            timestamp: row.timestamp,
        };
        match message.validate() {
            Ok(()) => messages.push(message),
            Err(err) => warn!(
                "Dropping invalid message row '{}' in room {}: {}",
                message.id, room, err
            ),
        }
    }
    messages
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn fetch_page(&self, room: &RoomId, limit: u32) -> Result<Vec<Message>, StoreError> {
        let room_key = room.as_str().to_string();
        let rows = self
            .run_blocking(move |conn| queries::query_recent_page(conn, &room_key, limit))
            .await?;
        Ok(decode_rows(room, rows))
    }

    async fn fetch_older_page(
        &self,
        room: &RoomId,
        end_before: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let room_key = room.as_str().to_string();
        let rows = self
            .run_blocking(move |conn| queries::query_older_page(conn, &room_key, end_before, limit))
            .await?;
        Ok(decode_rows(room, rows))
    }

    async fn subscribe_new(
        &self,
        room: &RoomId,
        start_at: i64,
    ) -> Result<Subscription, StoreError> {
        let mut events = self.inner.dispatcher.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let room = room.clone();

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::MessageCreated { room_id, message })
                        if room_id == room && message.timestamp >= start_at =>
                    {
                        if tx.send(Ok(message)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Non-fatal: report the gap, keep delivering
                        if tx.send(Err(StoreError::Lagged { missed })).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::with_release(rx, move || task.abort()))
    }

    async fn write(&self, room: &RoomId, draft: MessageDraft) -> Result<Message, StoreError> {
        draft.validate()?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            text: draft.text,
            sender: draft.sender,
            role: draft.role,
            timestamp: draft.timestamp,
        };

        let row = MessageRow {
            id: message.id.clone(),
            room_id: room.as_str().to_string(),
            sender: message.sender,
            role: message.role.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        };
        let room_key = room.as_str().to_string();
        let created_room = self
            .run_blocking(move |conn| {
                let existed = queries::room_exists(conn, &room_key)?;
                queries::insert_message(conn, &row)?;
                Ok(!existed)
            })
            .await?;

        if created_room {
            self.inner.dispatcher.publish(StoreEvent::RoomCreated {
                room_id: room.clone(),
            });
        }
        self.inner.dispatcher.publish(StoreEvent::MessageCreated {
            room_id: room.clone(),
            message: message.clone(),
        });

        Ok(message)
    }

    async fn watch_rooms(&self) -> Result<RoomWatch, StoreError> {
        let initial = self.room_list().await?;
        let mut events = self.inner.dispatcher.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();

        let task = tokio::spawn(async move {
            loop {
                let refresh = match events.recv().await {
                    Ok(StoreEvent::RoomCreated { .. }) | Ok(StoreEvent::RoomDeleted { .. }) => true,
                    Ok(_) => false,
                    // A lagged watcher just resyncs from the current list
                    Err(broadcast::error::RecvError::Lagged(_)) => true,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if refresh && tx.send(store.room_list().await).is_err() {
                    break;
                }
            }
        });

        Ok(RoomWatch::with_release(initial, rx, move || task.abort()))
    }

    async fn delete_room(&self, room: &RoomId) -> Result<(), StoreError> {
        let room_key = room.as_str().to_string();
        let removed = self
            .run_blocking(move |conn| queries::delete_room_messages(conn, &room_key))
            .await?;

        if removed > 0 {
            info!("Deleted room {} ({} messages)", room, removed);
            self.inner.dispatcher.publish(StoreEvent::RoomDeleted {
                room_id: room.clone(),
            });
        }
        Ok(())
    }
}
