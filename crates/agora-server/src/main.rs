use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_store::SqliteStore;

mod gateway;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("AGORA_DB_PATH").unwrap_or_else(|_| "agora.db".into());
    let host = std::env::var("AGORA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AGORA_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let store = SqliteStore::open(&PathBuf::from(&db_path))?;

    let app = Router::new()
        .route("/rooms", get(routes::list_rooms))
        .route("/rooms/{room_id}", delete(routes::delete_room))
        .route("/rooms/{room_id}/messages", get(routes::get_messages))
        .route("/rooms/{room_id}/messages", post(routes::send_message))
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(store)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Agora server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
