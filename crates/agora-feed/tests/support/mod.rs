//! Scripted in-memory message store for feed tests: call counters, an
//! unsubscribe spy, failure switches, and direct live injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use agora_store::{MessageStore, RoomWatch, Subscription};
use agora_types::{Message, MessageDraft, RoomId, RoomInfo, StoreError};

pub fn msg(id: &str, timestamp: i64) -> Message {
    Message {
        id: id.to_string(),
        text: format!("text of {id}"),
        sender: 1,
        role: None,
        timestamp,
    }
}

#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    rooms: Mutex<HashMap<RoomId, Vec<Message>>>,
    live: Mutex<Vec<LiveSender>>,
    room_watchers: Mutex<Vec<mpsc::UnboundedSender<Result<Vec<RoomInfo>, StoreError>>>>,
    scripted_older: Mutex<VecDeque<Vec<Message>>>,
    older_delay: Mutex<Option<Duration>>,
    fail_next_fetch: AtomicBool,
    fetch_calls: AtomicUsize,
    older_calls: AtomicUsize,
    write_calls: AtomicUsize,
    write_seq: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
}

struct LiveSender {
    room: RoomId,
    tx: mpsc::UnboundedSender<Result<Message, StoreError>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, room: &RoomId, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.timestamp);
        self.inner
            .rooms
            .lock()
            .unwrap()
            .entry(room.clone())
            .or_default()
            .extend(messages);
    }

    /// Deliver a message on every live subscription for `room`, regardless
    /// of its start cursor — tests script delivery explicitly.
    pub fn push_live(&self, room: &RoomId, message: Message) {
        let mut live = self.inner.live.lock().unwrap();
        live.retain(|s| {
            if &s.room != room {
                return true;
            }
            s.tx.send(Ok(message.clone())).is_ok()
        });
    }

    /// Deliver a non-fatal error item on every live subscription for `room`.
    pub fn push_live_error(&self, room: &RoomId) {
        let mut live = self.inner.live.lock().unwrap();
        live.retain(|s| {
            if &s.room != room {
                return true;
            }
            s.tx
                .send(Err(StoreError::Backend(anyhow::anyhow!(
                    "injected live failure"
                ))))
                .is_ok()
        });
    }

    /// Fail the next fetch (initial or older) with a transport error.
    pub fn fail_next_fetch(&self) {
        self.inner.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Override the result of upcoming older-page fetches, in order.
    pub fn script_older_page(&self, page: Vec<Message>) {
        self.inner.scripted_older.lock().unwrap().push_back(page);
    }

    /// Delay older-page fetches, keeping them observably in flight.
    pub fn set_older_delay(&self, delay: Duration) {
        *self.inner.older_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn older_calls(&self) -> usize {
        self.inner.older_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.inner.write_calls.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.inner.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.inner.unsubscribes.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        if self.inner.fail_next_fetch.swap(false, Ordering::SeqCst) {
            Err(StoreError::Backend(anyhow::anyhow!(
                "injected fetch failure"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageStore for MockStore {
    async fn fetch_page(&self, room: &RoomId, limit: u32) -> Result<Vec<Message>, StoreError> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;

        let rooms = self.inner.rooms.lock().unwrap();
        let all = rooms.get(room).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(limit as usize);
        Ok(all[start..].to_vec())
    }

    async fn fetch_older_page(
        &self,
        room: &RoomId,
        end_before: i64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.older_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.older_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_injected_failure()?;

        if let Some(page) = self.inner.scripted_older.lock().unwrap().pop_front() {
            return Ok(page);
        }

        let rooms = self.inner.rooms.lock().unwrap();
        let all = rooms.get(room).cloned().unwrap_or_default();
        let older: Vec<Message> = all
            .into_iter()
            .filter(|m| m.timestamp < end_before)
            .collect();
        let start = older.len().saturating_sub(limit as usize);
        Ok(older[start..].to_vec())
    }

    async fn subscribe_new(
        &self,
        room: &RoomId,
        _start_at: i64,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.live.lock().unwrap().push(LiveSender {
            room: room.clone(),
            tx,
        });

        let inner = self.inner.clone();
        Ok(Subscription::with_release(rx, move || {
            inner.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn write(&self, room: &RoomId, draft: MessageDraft) -> Result<Message, StoreError> {
        self.inner.write_calls.fetch_add(1, Ordering::SeqCst);
        draft.validate()?;

        let seq = self.inner.write_seq.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: format!("written-{seq}"),
            text: draft.text,
            sender: draft.sender,
            role: draft.role,
            timestamp: draft.timestamp,
        };

        {
            let mut rooms = self.inner.rooms.lock().unwrap();
            let list = rooms.entry(room.clone()).or_default();
            list.push(message.clone());
            list.sort_by_key(|m| m.timestamp);
        }
        self.push_live(room, message.clone());
        Ok(message)
    }

    async fn watch_rooms(&self) -> Result<RoomWatch, StoreError> {
        let rooms = self.inner.rooms.lock().unwrap();
        let initial: Vec<RoomInfo> = rooms
            .iter()
            .map(|(id, messages)| RoomInfo {
                id: id.clone(),
                message_count: messages.len() as u64,
                newest_timestamp: messages.last().map(|m| m.timestamp),
            })
            .collect();
        drop(rooms);

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.room_watchers.lock().unwrap().push(tx);
        Ok(RoomWatch::new(initial, rx))
    }

    async fn delete_room(&self, room: &RoomId) -> Result<(), StoreError> {
        self.inner.rooms.lock().unwrap().remove(room);
        Ok(())
    }
}
