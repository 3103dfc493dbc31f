// File: src/web_server.rs
// Web server with block explorer API, WebSocket push and block directory watching

use anyhow::Result;
use axum::{
    extract::{ws::Message, ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, Router},
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt};
use notify::{Event, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::{broadcast, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::block_store::{is_block_file, load_blocks, BlockFilter, BlockStore};
use crate::data_models::{AppConfig, BlockInfo, ClientMessage, ServerMessage};
use crate::model::{BlockSummary, Tx};

/// Largest range served by `/api/blocks/range`
pub const MAX_RANGE: u64 = 1000;

/// Query parameters for range search
#[derive(Deserialize)]
struct RangeQuery {
    start: u64,
    end: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<RwLock<BlockStore>>,
    pub update_broadcaster: broadcast::Sender<Vec<BlockInfo>>,
}

impl AppState {
    pub fn new(config: AppConfig, store: BlockStore) -> Self {
        let (update_tx, _update_rx) = broadcast::channel(100);
        Self {
            config,
            store: Arc::new(RwLock::new(store)),
            update_broadcaster: update_tx,
        }
    }
}

/// Transaction lookup response
#[derive(serde::Serialize)]
struct TxLookup<'a> {
    height: u64,
    index: usize,
    transaction: &'a Tx,
}

/// Run the web server with block directory monitoring
pub async fn run_web_mode(config: &AppConfig, bind: &str, port: u16, enable_cors: bool) -> Result<()> {
    let app_state = AppState::new(config.clone(), BlockStore::default());
    reload_blocks(&app_state).await?;

    let app = build_router(app_state.clone(), enable_cors);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;

    info!("Web explorer available at http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);
    info!("API endpoints: /api/blocks, /api/block/:height, /api/blocks/range?start=X&end=Y, /api/tx/:id");

    let watch_state = app_state.clone();
    tokio::spawn(async move {
        start_block_watcher(watch_state).await;
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes for the explorer, optionally wrapped in a permissive CORS layer
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(dashboard_html))
        .route("/api/blocks", get(get_blocks))
        .route("/api/block/:height", get(get_block_detail))
        .route("/api/blocks/range", get(get_blocks_range))
        .route("/api/tx/:id", get(get_transaction))
        .route("/ws", get(websocket_handler))
        .with_state(state);

    if enable_cors {
        app.layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(tower_http::cors::Any)
                    .allow_methods(tower_http::cors::Any)
                    .allow_headers(tower_http::cors::Any),
            ),
        )
    } else {
        app
    }
}

/// Decode the block path again and swap in the new index
pub async fn reload_blocks(state: &AppState) -> Result<()> {
    let path = state.config.blocks_path.clone();
    let store = tokio::task::spawn_blocking(move || load_blocks(&path)).await??;

    info!(
        blocks = store.len(),
        skipped = store.skipped.len(),
        failed = store.failures.len(),
        latest = ?store.latest_height(),
        "Block index loaded"
    );
    for failure in &store.failures {
        warn!(path = %failure.path.display(), error = %failure.error, "Block file not indexed");
    }

    *state.store.write().await = store;
    Ok(())
}

/// Watch the block path and reload on new or modified block files
async fn start_block_watcher(state: AppState) {
    let blocks_path = state.config.blocks_path.clone();
    let (tx, mut rx) = tokio::sync::mpsc::channel(100);

    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if (event.kind.is_create() || event.kind.is_modify())
                && event.paths.iter().any(|p| is_block_file(p))
            {
                if let Err(e) = tx.blocking_send(()) {
                    debug!("Failed to send file change event: {}", e);
                }
            }
        }
        Err(e) => error!("File watch error: {:?}", e),
    });

    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("Failed to create file watcher: {}", e);
            return;
        }
    };

    if let Err(e) = watcher.watch(&blocks_path, RecursiveMode::NonRecursive) {
        error!("Failed to watch {}: {}", blocks_path.display(), e);
        return;
    }
    info!("Watching {} for new blocks", blocks_path.display());

    let mut debounce_handle: Option<tokio::task::JoinHandle<()>> = None;
    while rx.recv().await.is_some() {
        if let Some(handle) = debounce_handle.take() {
            handle.abort();
        }

        let update_state = state.clone();
        debounce_handle = Some(tokio::spawn(async move {
            // Wait for writes to complete
            tokio::time::sleep(Duration::from_millis(500)).await;

            if let Err(e) = reload_blocks(&update_state).await {
                error!("Error reloading blocks: {:#}", e);
                return;
            }
            let index = update_state.store.read().await.overviews();
            if update_state.update_broadcaster.send(index).is_err() {
                debug!("No WebSocket subscribers for index update");
            }
        }));
    }

    drop(watcher);
}

async fn dashboard_html() -> Html<&'static str> {
    Html(include_str!("dashboard.html"))
}

async fn get_blocks(State(state): State<AppState>) -> Json<Vec<BlockInfo>> {
    Json(state.store.read().await.overviews())
}

async fn get_block_detail(
    Path(height): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<BlockSummary>, StatusCode> {
    let store = state.store.read().await;
    store.get(height).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_blocks_range(
    Query(params): Query<RangeQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if params.start > params.end || params.end - params.start >= MAX_RANGE {
        return Err(StatusCode::BAD_REQUEST);
    }

    let store = state.store.read().await;
    let blocks = store.filter(BlockFilter::Range(params.start, params.end));
    Ok(Json(serde_json::json!({
        "start": params.start,
        "end": params.end,
        "total_found": blocks.len(),
        "blocks": blocks,
    })))
}

async fn get_transaction(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let store = state.store.read().await;
    let (block, index, tx) = store.find_transaction(&id).ok_or(StatusCode::NOT_FOUND)?;

    serde_json::to_value(TxLookup { height: block.height, index, transaction: tx })
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Serve one WebSocket client: initial index, requests, and pushed updates
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let initial = ServerMessage::Index { blocks: state.store.read().await.overviews() };
    if send_message(&mut sender, &initial).await.is_err() {
        return;
    }

    let mut updates = state.update_broadcaster.subscribe();

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(blocks) => {
                        if send_message(&mut sender, &ServerMessage::Index { blocks }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagged behind index updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(request) => handle_websocket_message(request, &state).await,
                            Err(e) => ServerMessage::Error { message: format!("Invalid request: {}", e) },
                        };
                        if send_message(&mut sender, &response).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_message<S>(sender: &mut S, message: &ServerMessage) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = serde_json::to_string(message)?;
    sender.send(Message::Text(json)).await?;
    Ok(())
}

/// Answer one WebSocket request
pub async fn handle_websocket_message(message: ClientMessage, state: &AppState) -> ServerMessage {
    match message {
        ClientMessage::GetIndex => ServerMessage::Index {
            blocks: state.store.read().await.overviews(),
        },
        ClientMessage::GetBlock { height } => match state.store.read().await.get(height) {
            Some(block) => ServerMessage::Block { block: block.clone() },
            None => ServerMessage::Error {
                message: format!("Block {} not found", height),
            },
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{TxFixture, write_demo_blocks};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn demo_state(count: u64) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        write_demo_blocks(dir.path(), count).unwrap();
        let config = AppConfig { blocks_path: dir.path().to_path_buf() };
        let state = AppState::new(config, BlockStore::default());
        reload_blocks(&state).await.unwrap();
        (dir, state)
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = build_router(state.clone(), false)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_block_endpoint() {
        let (_dir, state) = demo_state(3).await;
        let (status, json) = get_json(&state, "/api/block/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["blockHeight"], 2);
        assert_eq!(json["txList"].as_array().unwrap().len(), 3);
        assert_eq!(json["txList"][0]["validationCode"], "VALID");
        assert_eq!(json["txList"][0]["eventName"], "transfer");
        assert_eq!(json["txList"][0]["chain_code_input"][0], "transfer");

        let (status, _) = get_json(&state, "/api/block/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blocks_index_newest_first() {
        let (_dir, state) = demo_state(4).await;
        let (status, json) = get_json(&state, "/api/blocks").await;
        assert_eq!(status, StatusCode::OK);
        let heights: Vec<u64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["height"].as_u64().unwrap())
            .collect();
        assert_eq!(heights, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_range_endpoint() {
        let (_dir, state) = demo_state(5).await;
        let (status, json) = get_json(&state, "/api/blocks/range?start=2&end=4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_found"], 3);

        let (status, _) = get_json(&state, "/api/blocks/range?start=4&end=2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(&state, "/api/blocks/range?start=0&end=5000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transaction_endpoint() {
        let (_dir, state) = demo_state(2).await;
        let tx_id = format!("{:064x}", 2001u64);
        let (status, json) = get_json(&state, &format!("/api/tx/{}", tx_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["height"], 2);
        assert_eq!(json["index"], 1);
        assert_eq!(json["transaction"]["id"], tx_id);

        let (status, _) = get_json(&state, "/api/tx/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_websocket_messages() {
        let (_dir, state) = demo_state(1).await;

        assert!(matches!(
            handle_websocket_message(ClientMessage::Ping, &state).await,
            ServerMessage::Pong
        ));
        match handle_websocket_message(ClientMessage::GetBlock { height: 1 }, &state).await {
            ServerMessage::Block { block } => assert_eq!(block.height, 1),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(matches!(
            handle_websocket_message(ClientMessage::GetBlock { height: 8 }, &state).await,
            ServerMessage::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_files() {
        let (dir, state) = demo_state(1).await;
        let bytes = crate::samples::valid_block_bytes(2, &[TxFixture::new("late")]);
        std::fs::write(dir.path().join("000002.block"), bytes).unwrap();

        reload_blocks(&state).await.unwrap();
        assert_eq!(state.store.read().await.latest_height(), Some(2));
    }
}
