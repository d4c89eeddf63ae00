pub mod dispatcher;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use agora_types::{Message, MessageDraft, RoomId, RoomInfo, StoreError};

pub use dispatcher::Dispatcher;
pub use sqlite::SqliteStore;

/// The message-store boundary: point queries with ordering/limit, a
/// cursor-bounded older-page query, live subscriptions, and the
/// administrative room operations.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The most recent `limit` messages of a room, ascending by timestamp.
    async fn fetch_page(&self, room: &RoomId, limit: u32) -> Result<Vec<Message>, StoreError>;

    /// Up to `limit` messages strictly older than `end_before`, ascending.
    async fn fetch_older_page(
        &self,
        room: &RoomId,
        end_before: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError>;

    /// Live delivery of messages written to `room` with
    /// `timestamp >= start_at`. Dropping the handle unsubscribes.
    async fn subscribe_new(
        &self,
        room: &RoomId,
        start_at: i64,
    ) -> Result<Subscription, StoreError>;

    /// Validate and persist a draft. The store assigns the id. Creates the
    /// room implicitly on its first message.
    async fn write(&self, room: &RoomId, draft: MessageDraft) -> Result<Message, StoreError>;

    /// Current room list plus a full refreshed list on every change.
    async fn watch_rooms(&self) -> Result<RoomWatch, StoreError>;

    /// Remove a room's entire message collection. Administrative.
    async fn delete_room(&self, room: &RoomId) -> Result<(), StoreError>;
}

/// Live new-message subscription handle. Exactly one is alive per mounted
/// feed; dropping it releases the underlying listener.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<Message, StoreError>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Result<Message, StoreError>>) -> Self {
        Self { rx, release: None }
    }

    pub fn with_release(
        rx: mpsc::UnboundedReceiver<Result<Message, StoreError>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Next live item. An `Err` item is a non-fatal delivery failure; the
    /// store does not retry on the caller's behalf. `None` means the stream
    /// ended.
    pub async fn next(&mut self) -> Option<Result<Message, StoreError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Room-list subscription: a snapshot at subscribe time plus a full
/// refreshed list on every room created/deleted. Dropping unsubscribes.
pub struct RoomWatch {
    initial: Vec<RoomInfo>,
    rx: mpsc::UnboundedReceiver<Result<Vec<RoomInfo>, StoreError>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RoomWatch {
    pub fn new(
        initial: Vec<RoomInfo>,
        rx: mpsc::UnboundedReceiver<Result<Vec<RoomInfo>, StoreError>>,
    ) -> Self {
        Self {
            initial,
            rx,
            release: None,
        }
    }

    pub fn with_release(
        initial: Vec<RoomInfo>,
        rx: mpsc::UnboundedReceiver<Result<Vec<RoomInfo>, StoreError>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            initial,
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn initial(&self) -> &[RoomInfo] {
        &self.initial
    }

    pub async fn next(&mut self) -> Option<Result<Vec<RoomInfo>, StoreError>> {
        self.rx.recv().await
    }
}

impl Drop for RoomWatch {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RoomWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomWatch")
            .field("initial", &self.initial.len())
            .finish_non_exhaustive()
    }
}
