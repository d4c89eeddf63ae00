use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

use agora_store::MessageStore;
use agora_types::{
    FeedError, FeedEvent, Message, MessageDraft, Notification, NoticeKind, RoomId, StoreError,
};

/// Feed tunables.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Messages per page, for the initial fetch and every older-page fetch.
    pub page_size: u32,
    /// Minimum interval between older-page fetches; rapid triggers from
    /// fast scrolling inside the window are coalesced into no-ops.
    pub throttle: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            throttle: Duration::from_millis(250),
        }
    }
}

/// Controller state for one mounted room view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No page loaded yet for the current room.
    Idle,
    LoadingInitial,
    Ready,
    LoadingOlder,
    /// Ready, and no older history remains.
    Exhausted,
}

/// The stable ordered view handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub room: RoomId,
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub initial_loaded: bool,
    pub state: FeedState,
}

enum Command {
    LoadNext {
        done: oneshot::Sender<Result<(), FeedError>>,
    },
    Send {
        draft: MessageDraft,
        done: oneshot::Sender<Result<(), FeedError>>,
    },
    SwitchRoom {
        room: RoomId,
        done: oneshot::Sender<Result<(), FeedError>>,
    },
    Snapshot {
        reply: oneshot::Sender<FeedSnapshot>,
    },
}

struct FetchOutcome {
    generation: u64,
    result: Result<Vec<Message>, StoreError>,
}

struct LiveItem {
    generation: u64,
    item: Result<Message, StoreError>,
}

/// Owner handle for a per-room message feed. Each mounted view holds
/// exactly one; dropping it shuts the feed down and releases the live
/// subscription.
pub struct Feed {
    commands: mpsc::UnboundedSender<Command>,
}

impl Feed {
    /// Start a feed for `room`. Returns the handle and the event stream
    /// for the presentation layer. Nothing is fetched until the first
    /// `load_next`.
    pub fn spawn(
        store: Arc<dyn MessageStore>,
        room: RoomId,
        config: FeedConfig,
    ) -> (Feed, mpsc::UnboundedReceiver<FeedEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (live_tx, live_rx) = mpsc::unbounded_channel();

        let actor = FeedActor {
            store,
            config,
            events: event_tx,
            fetch_tx,
            live_tx,
            room,
            state: FeedState::Idle,
            messages: Vec::new(),
            seen: HashSet::new(),
            oldest: None,
            has_more: true,
            initial_loaded: false,
            generation: 0,
            last_older_fetch: None,
            live_task: None,
            pending_load: None,
        };
        tokio::spawn(actor.run(command_rx, fetch_rx, live_rx));

        (
            Feed {
                commands: command_tx,
            },
            event_rx,
        )
    }

    /// Trigger the next page load: the initial page on the first call for
    /// a room, an older page afterwards. A no-op while a fetch is in
    /// flight, after end-of-history, and inside the throttle window.
    /// Transport failures surface as `Notice` events, not as errors here.
    pub async fn load_next(&self) -> Result<(), FeedError> {
        self.request(|done| Command::LoadNext { done }).await
    }

    /// Validate and write a new message. Invalid drafts fail fast without
    /// any store call; the message appears in the list via the live
    /// stream, never by optimistic append.
    pub async fn send(&self, draft: MessageDraft) -> Result<(), FeedError> {
        self.request(|done| Command::Send { draft, done }).await
    }

    /// Reset the feed onto another room: clears the list, cursor and
    /// end-of-history flag, releases the previous live subscription, and
    /// restarts the load/subscribe sequence.
    pub async fn switch_room(&self, room: RoomId) -> Result<(), FeedError> {
        self.request(|done| Command::SwitchRoom { room, done }).await
    }

    pub async fn snapshot(&self) -> Result<FeedSnapshot, FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply: reply_tx })
            .map_err(|_| FeedError::Closed)?;
        reply_rx.await.map_err(|_| FeedError::Closed)
    }

    async fn request<F>(&self, make: F) -> Result<(), FeedError>
    where
        F: FnOnce(oneshot::Sender<Result<(), FeedError>>) -> Command,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands.send(make(done_tx)).map_err(|_| {
            error!("Feed command issued after shutdown");
            FeedError::Closed
        })?;
        done_rx.await.map_err(|_| FeedError::Closed)?
    }
}

struct FeedActor {
    store: Arc<dyn MessageStore>,
    config: FeedConfig,
    events: mpsc::UnboundedSender<FeedEvent>,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    live_tx: mpsc::UnboundedSender<LiveItem>,

    room: RoomId,
    state: FeedState,
    /// Materialized view: ascending by timestamp for paged history, with
    /// live messages in receipt order at the tail.
    messages: Vec<Message>,
    /// Ids present in `messages`; duplicates are dropped at merge time.
    seen: HashSet<String>,
    /// Timestamp of the oldest loaded message, the exclusive bound for the
    /// next older-page fetch.
    oldest: Option<i64>,
    has_more: bool,
    initial_loaded: bool,
    /// Bumped on every room switch; in-flight fetches and live streams
    /// carry the generation they were started under, so stale results are
    /// discarded instead of landing in the wrong room's state.
    generation: u64,
    last_older_fetch: Option<Instant>,
    live_task: Option<JoinHandle<()>>,
    pending_load: Option<oneshot::Sender<Result<(), FeedError>>>,
}

impl FeedActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
        mut live_rx: mpsc::UnboundedReceiver<LiveItem>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.on_command(cmd).await;
                }
                Some(outcome) = fetch_rx.recv() => self.on_fetch_outcome(outcome),
                Some(item) = live_rx.recv() => self.on_live_item(item),
            }
        }
        self.release_live();
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::LoadNext { done } => self.load_next(done).await,
            Command::Send { draft, done } => {
                let result = self.send(draft).await;
                let _ = done.send(result);
            }
            Command::SwitchRoom { room, done } => {
                let result = self.switch_room(room).await;
                let _ = done.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn load_next(&mut self, done: oneshot::Sender<Result<(), FeedError>>) {
        match self.state {
            FeedState::Idle => {
                let result = self.load_initial().await;
                let _ = done.send(result);
            }
            FeedState::Ready => self.start_older_fetch(done),
            // In-flight fetch or exhausted history: no-op
            FeedState::LoadingInitial | FeedState::LoadingOlder | FeedState::Exhausted => {
                let _ = done.send(Ok(()));
            }
        }
    }

    /// Fetch the most recent page and open the live stream. Awaited to
    /// completion before any older fetch or subscription starts.
    async fn load_initial(&mut self) -> Result<(), FeedError> {
        self.state = FeedState::LoadingInitial;
        match self
            .store
            .fetch_page(&self.room, self.config.page_size)
            .await
        {
            Ok(page) => {
                let fetched = page.len();
                self.messages.clear();
                self.seen.clear();
                for message in page {
                    if self.seen.insert(message.id.clone()) {
                        self.messages.push(message);
                    }
                }
                self.oldest = self.messages.first().map(|m| m.timestamp);
                self.has_more = fetched as u32 >= self.config.page_size;
                self.initial_loaded = true;
                self.state = if self.has_more {
                    FeedState::Ready
                } else {
                    FeedState::Exhausted
                };
                let _ = self.events.send(FeedEvent::InitialLoaded {
                    messages: self.messages.clone(),
                    has_more: self.has_more,
                });
                if !self.has_more {
                    let _ = self.events.send(FeedEvent::EndOfHistory);
                }
                self.open_live_stream();
                Ok(())
            }
            Err(err) => {
                warn!("Initial fetch for room {} failed: {}", self.room, err);
                // Back to idle so the next load_next retries
                self.state = FeedState::Idle;
                self.notify(NoticeKind::FetchFailed, "Could not load messages");
                Ok(())
            }
        }
    }

    fn start_older_fetch(&mut self, done: oneshot::Sender<Result<(), FeedError>>) {
        let Some(cursor) = self.oldest else {
            // A ready feed with no oldest timestamp has nothing older
            self.has_more = false;
            self.state = FeedState::Exhausted;
            let _ = done.send(Ok(()));
            return;
        };

        let now = Instant::now();
        if let Some(last) = self.last_older_fetch {
            if now.duration_since(last) < self.config.throttle {
                // Coalesce rapid triggers
                let _ = done.send(Ok(()));
                return;
            }
        }
        self.last_older_fetch = Some(now);
        self.state = FeedState::LoadingOlder;
        self.pending_load = Some(done);

        let store = self.store.clone();
        let room = self.room.clone();
        let limit = self.config.page_size;
        let generation = self.generation;
        let fetch_tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = store.fetch_older_page(&room, cursor, limit).await;
            let _ = fetch_tx.send(FetchOutcome { generation, result });
        });
    }

    fn on_fetch_outcome(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            trace!("Discarding stale fetch result for room {}", self.room);
            return;
        }
        let done = self.pending_load.take();

        match outcome.result {
            Ok(page) => {
                // End-of-history is judged on the raw page, before dedup
                let fetched = page.len();
                let fresh: Vec<Message> = page
                    .into_iter()
                    .filter(|m| !self.seen.contains(&m.id))
                    .collect();
                for message in &fresh {
                    self.seen.insert(message.id.clone());
                }
                let prepended = fresh.len();
                self.messages.splice(0..0, fresh);
                if let Some(first) = self.messages.first() {
                    self.oldest = Some(first.timestamp);
                }
                if (fetched as u32) < self.config.page_size {
                    self.has_more = false;
                }
                self.state = if self.has_more {
                    FeedState::Ready
                } else {
                    FeedState::Exhausted
                };
                let _ = self.events.send(FeedEvent::OlderLoaded {
                    prepended,
                    has_more: self.has_more,
                });
                if !self.has_more {
                    let _ = self.events.send(FeedEvent::EndOfHistory);
                }
            }
            Err(err) => {
                warn!("Older-page fetch for room {} failed: {}", self.room, err);
                // Cursor and has_more are unchanged, so a retry stays
                // possible
                self.state = if self.has_more {
                    FeedState::Ready
                } else {
                    FeedState::Exhausted
                };
                self.notify(NoticeKind::FetchFailed, "Could not load older messages");
            }
        }

        if let Some(done) = done {
            let _ = done.send(Ok(()));
        }
    }

    fn on_live_item(&mut self, item: LiveItem) {
        if item.generation != self.generation {
            return; // stale stream after a room switch
        }
        match item.item {
            Ok(message) => {
                if !self.seen.insert(message.id.clone()) {
                    trace!("Duplicate live message {} dropped", message.id);
                    return;
                }
                // Receipt order at the tail; the live path deduplicates
                // but never re-sorts
                self.messages.push(message.clone());
                let _ = self.events.send(FeedEvent::Appended { message });
                let _ = self.events.send(FeedEvent::ScrollToBottom);
            }
            Err(err) => {
                warn!("Live subscription for room {} failed: {}", self.room, err);
                // Notify only; re-subscribing is not this controller's job
                self.notify(NoticeKind::SubscriptionLost, "Live updates interrupted");
            }
        }
    }

    async fn send(&mut self, draft: MessageDraft) -> Result<(), FeedError> {
        // Fail fast: an invalid draft never reaches the store
        draft.validate()?;
        match self.store.write(&self.room, draft).await {
            // No optimistic append; the live stream delivers our own
            // message back
            Ok(_) => Ok(()),
            Err(err) => {
                warn!("Send to room {} failed: {}", self.room, err);
                self.notify(NoticeKind::SendFailed, "Message could not be sent");
                Err(err.into())
            }
        }
    }

    async fn switch_room(&mut self, room: RoomId) -> Result<(), FeedError> {
        if room == self.room {
            return Ok(());
        }
        info!("Feed switching room {} -> {}", self.room, room);

        // Release the old subscription before rebuilding state so no
        // cross-room message can leak in
        self.release_live();
        self.generation += 1;
        self.room = room.clone();
        self.messages.clear();
        self.seen.clear();
        self.oldest = None;
        self.has_more = true;
        self.initial_loaded = false;
        self.last_older_fetch = None;
        self.state = FeedState::Idle;
        if let Some(done) = self.pending_load.take() {
            let _ = done.send(Ok(()));
        }
        let _ = self.events.send(FeedEvent::RoomSwitched { room_id: room });

        self.load_initial().await
    }

    /// Open the live stream for the current room. The start cursor is
    /// wall-clock now, captured once when the initial load completes;
    /// history up to this point is covered by the fetched pages only.
    fn open_live_stream(&mut self) {
        self.release_live();

        let start_at = Utc::now().timestamp_millis();
        let store = self.store.clone();
        let room = self.room.clone();
        let live_tx = self.live_tx.clone();
        let generation = self.generation;

        let task = tokio::spawn(async move {
            let mut subscription = match store.subscribe_new(&room, start_at).await {
                Ok(sub) => sub,
                Err(err) => {
                    let _ = live_tx.send(LiveItem {
                        generation,
                        item: Err(err),
                    });
                    return;
                }
            };
            while let Some(item) = subscription.next().await {
                if live_tx.send(LiveItem { generation, item }).is_err() {
                    break;
                }
            }
        });
        self.live_task = Some(task);
    }

    fn release_live(&mut self) {
        if let Some(task) = self.live_task.take() {
            // Dropping the pump drops its Subscription, which unsubscribes
            task.abort();
        }
    }

    fn notify(&self, kind: NoticeKind, text: &str) {
        let _ = self
            .events
            .send(FeedEvent::Notice(Notification::new(kind, text)));
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            room: self.room.clone(),
            messages: self.messages.clone(),
            has_more: self.has_more,
            initial_loaded: self.initial_loaded,
            state: self.state,
        }
    }
}
