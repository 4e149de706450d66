//! # Live Feed
//!
//! Pushes every [`EnrichedNotification`] to connected operator screens.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Orchestrator ── publish() ──► broadcast (256) ──┬──► /ws client 1      │
//! │                  never blocks                    ├──► /ws client 2      │
//! │                                                  └──► /ws client N      │
//! │                                                                         │
//! │  GET /ws                     JSON text frame per notification           │
//! │  GET /image/capture/{ref}    snapshot named by a notification's ref     │
//! │  GET /image/person/{card}    registry photo                             │
//! │  GET /health                 "OK"                                       │
//! │                                                                         │
//! │  A client that falls behind skips the missed notifications.             │
//! │  Shutdown closes every subscriber socket.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thermo_core::{CardNumber, EnrichedNotification};
use thermo_db::{DbResult, ImageStore};

use crate::error::{BridgeError, BridgeResult};
use crate::ports::Publisher;

/// Default broadcast depth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Live Feed
// =============================================================================

/// Broadcast fan-out of notifications.
#[derive(Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<EnrichedNotification>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        LiveFeed { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrichedNotification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        LiveFeed::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Publisher for LiveFeed {
    fn publish(&self, notification: EnrichedNotification) {
        match self.tx.send(notification) {
            Ok(subscribers) => debug!(subscribers, "Notification published"),
            Err(_) => debug!("Notification published with no subscribers"),
        }
    }
}

// =============================================================================
// Live Feed Server
// =============================================================================

/// HTTP/WebSocket front for a [`LiveFeed`] and the stored images.
pub struct LiveFeedServer {
    bind_addr: String,
    port: u16,
    feed: LiveFeed,
    images: ImageStore,
}

#[derive(Clone)]
struct ServerState {
    feed: LiveFeed,
    images: ImageStore,
    cancel: CancellationToken,
}

impl LiveFeedServer {
    pub fn new(bind_addr: impl Into<String>, port: u16, feed: LiveFeed, images: ImageStore) -> Self {
        LiveFeedServer {
            bind_addr: bind_addr.into(),
            port,
            feed,
            images,
        }
    }

    /// Binds and serves until `cancel` fires. Returns the bound address.
    pub async fn start(self, cancel: CancellationToken) -> BridgeResult<(SocketAddr, JoinHandle<()>)> {
        let state = ServerState {
            feed: self.feed,
            images: self.images,
            cancel: cancel.clone(),
        };
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/image/capture/{*image_ref}", get(capture_handler))
            .route("/image/person/{card}", get(person_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        let bind_addr = format!("{}:{}", self.bind_addr, self.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| BridgeError::LiveFeed(format!("Failed to bind to {}: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::LiveFeed(e.to_string()))?;

        info!(addr = %local_addr, "Live feed listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                    info!("Live feed shutting down");
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Live feed server failed");
            }
        });

        Ok((local_addr, handle))
    }
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn capture_handler(
    Path(image_ref): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    if !ImageStore::is_capture_ref(&image_ref) {
        return (StatusCode::BAD_REQUEST, "invalid image reference").into_response();
    }
    image_response(state.images.read_capture(&image_ref).await)
}

async fn person_handler(Path(card): Path<String>, State(state): State<ServerState>) -> Response {
    let Ok(card) = card.parse::<CardNumber>() else {
        return (StatusCode::BAD_REQUEST, "invalid card number").into_response();
    };
    image_response(state.images.read_photo(card).await)
}

fn image_response(result: DbResult<Option<Vec<u8>>>) -> Response {
    match result {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "Image read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.feed, state.cancel))
}

/// Forwards notifications until the client leaves or the server shuts down.
async fn handle_socket(socket: WebSocket, feed: LiveFeed, cancel: CancellationToken) {
    let (mut sender, mut receiver) = socket.split();
    let mut notifications = feed.subscribe();
    debug!(subscribers = feed.subscriber_count(), "Live subscriber joined");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            received = notifications.recv() => match received {
                Ok(notification) => {
                    let json = match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Notification not serializable");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Live subscriber left");
}
