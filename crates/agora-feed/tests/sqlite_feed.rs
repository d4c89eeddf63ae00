//! End-to-end: the feed controller over the real SQLite store.

use std::sync::Arc;
use std::time::Duration;

use agora_feed::{Feed, FeedConfig, RoomDirectory};
use agora_store::{MessageStore, SqliteStore};
use agora_types::{FeedEvent, MessageDraft, RoomId};

fn config() -> FeedConfig {
    FeedConfig {
        page_size: 25,
        throttle: Duration::ZERO,
    }
}

async fn seed(store: &SqliteStore, room: &RoomId, count: i64) {
    for i in 0..count {
        store
            .write(room, MessageDraft::new(format!("msg {i}"), 1, 1000 + i))
            .await
            .unwrap();
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn feed_paginates_sqlite_history_to_exhaustion() {
    let store = SqliteStore::open_in_memory().unwrap();
    let room = RoomId::new("7");
    seed(&store, &room, 30).await;

    let (feed, _events) = Feed::spawn(Arc::new(store.clone()), room, config());

    feed.load_next().await.unwrap();
    let snap = feed.snapshot().await.unwrap();
    assert_eq!(snap.messages.len(), 25);
    assert_eq!(snap.messages.first().unwrap().timestamp, 1005);
    assert!(snap.has_more);

    feed.load_next().await.unwrap();
    let snap = feed.snapshot().await.unwrap();
    assert_eq!(snap.messages.len(), 30);
    assert_eq!(snap.messages.first().unwrap().timestamp, 1000);
    assert!(!snap.has_more);
    assert!(
        snap.messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    );
}

#[tokio::test]
async fn feed_receives_live_messages_written_after_load() {
    let store = SqliteStore::open_in_memory().unwrap();
    let room = RoomId::new("7");
    seed(&store, &room, 3).await;

    let (feed, mut events) = Feed::spawn(Arc::new(store.clone()), room.clone(), config());
    feed.load_next().await.unwrap();

    // The live stream subscribes asynchronously after the initial load
    let dispatcher = store.dispatcher().clone();
    wait_until(move || dispatcher.receiver_count() >= 1).await;

    // Past the wall-clock start cursor captured at load completion
    let now = chrono::Utc::now().timestamp_millis();
    store
        .write(&room, MessageDraft::new("breaking news", 2, now + 60_000))
        .await
        .unwrap();

    loop {
        match tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for live append")
            .expect("event stream closed")
        {
            FeedEvent::Appended { message } => {
                assert_eq!(message.text, "breaking news");
                break;
            }
            _ => {}
        }
    }

    let snap = feed.snapshot().await.unwrap();
    assert_eq!(snap.messages.len(), 4);
}

#[tokio::test]
async fn room_directory_tracks_creation_and_deletion() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .write(&RoomId::new("a"), MessageDraft::new("hi", 1, 10))
        .await
        .unwrap();
    store
        .write(&RoomId::new("b"), MessageDraft::new("hi", 1, 20))
        .await
        .unwrap();

    let mut directory = RoomDirectory::open(Arc::new(store.clone())).await.unwrap();
    assert_eq!(directory.rooms().len(), 2);

    store
        .write(&RoomId::new("c"), MessageDraft::new("hi", 1, 30))
        .await
        .unwrap();
    directory.changed().await.unwrap().unwrap();
    assert_eq!(directory.rooms().len(), 3);

    directory.delete_room(&RoomId::new("a")).await.unwrap();
    directory.changed().await.unwrap().unwrap();
    assert_eq!(directory.rooms().len(), 2);
    assert!(directory.rooms().iter().all(|r| r.id.as_str() != "a"));
}
