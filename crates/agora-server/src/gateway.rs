use std::collections::HashSet;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use agora_store::{Dispatcher, SqliteStore};
use agora_types::{GatewayCommand, RoomId, StoreEvent};

/// Server pings every 15 seconds to keep intermediaries from timing out
/// idle connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn ws_upgrade(
    State(store): State<SqliteStore>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = store.dispatcher().clone();
    ws.on_upgrade(move |socket| handle_connection(socket, dispatcher))
}

/// One task per connection: relay store events to the client, filtered to
/// its subscribed rooms, and apply Subscribe commands from the client.
async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = dispatcher.subscribe();
    let mut subscribed: HashSet<RoomId> = HashSet::new();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    info!("Gateway client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Gateway client lagged, {} events dropped", missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !should_forward(&event, &subscribed) {
                    continue;
                }
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<GatewayCommand>(&text) {
                            Ok(GatewayCommand::Subscribe { room_ids }) => {
                                trace!("Gateway client subscribed to {} rooms", room_ids.len());
                                subscribed = room_ids.into_iter().collect();
                            }
                            Err(err) => warn!("Ignoring malformed gateway command: {}", err),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Gateway client disconnected");
}

/// Message events are delivered only for subscribed rooms; room-list
/// events always go out.
fn should_forward(event: &StoreEvent, subscribed: &HashSet<RoomId>) -> bool {
    match event {
        StoreEvent::MessageCreated { room_id, .. } => subscribed.contains(room_id),
        StoreEvent::RoomCreated { .. } | StoreEvent::RoomDeleted { .. } => true,
    }
}
