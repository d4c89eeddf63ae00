use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use agora_store::{MessageStore, SqliteStore};
use agora_types::{MessageDraft, RoomId, StoreError};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the timestamp of the oldest message
    /// from the previous page to fetch older messages.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    25
}

pub async fn list_rooms(
    State(store): State<SqliteStore>,
) -> Result<impl IntoResponse, StatusCode> {
    let rooms = store.room_list().await.map_err(internal)?;
    Ok(Json(rooms))
}

pub async fn delete_room(
    State(store): State<SqliteStore>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    store
        .delete_room(&RoomId::new(room_id))
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_messages(
    State(store): State<SqliteStore>,
    Path(room_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let room = RoomId::new(room_id);
    let limit = query.limit.min(200);

    let messages = match query.before {
        Some(cursor) => store.fetch_older_page(&room, cursor, limit).await,
        None => store.fetch_page(&room, limit).await,
    }
    .map_err(internal)?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(store): State<SqliteStore>,
    Path(room_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<impl IntoResponse, StatusCode> {
    match store.write(&RoomId::new(room_id), draft).await {
        Ok(message) => Ok((StatusCode::CREATED, Json(message))),
        Err(StoreError::Validation(_)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(err) => Err(internal(err)),
    }
}

fn internal(err: StoreError) -> StatusCode {
    error!("Store operation failed: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}
