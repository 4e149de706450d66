//! # Registry Link
//!
//! One persistent WebSocket to the personnel registry, shared by every
//! orchestrator task. Lookups are correlated by `uid_request`; status pushes
//! are fire-and-forget.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller A ─┐                                                            │
//! │  caller B ─┼─► PendingTable.attach("786777")                            │
//! │  caller C ─┘        │ created? ── yes (A only) ──► outbound queue (10)  │
//! │                     │                                   │               │
//! │                     ▼                                   ▼               │
//! │              waiter A/B/C ◄── resolve ◄── reader ◄── registry ◄── writer│
//! │                                                                         │
//! │  Each waiter selects on: its response │ its own timeout │ cancellation  │
//! │  A timeout detaches that waiter only.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The outbound queue outlives individual connections, so requests queued
//! while the registry is down go out after the next reconnect.

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thermo_core::{CardNumber, IdentityRecord, StatusMessage};

use crate::error::{BridgeError, BridgeResult};
use crate::link::{self, LinkHealth, ReconnectDelay, SharedSink, WsStream};
use crate::pending::PendingTable;
use crate::ports::CorrelatedRequester;
use crate::protocol::{RegistryRequest, RegistryResponse};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the registry link.
#[derive(Debug, Clone)]
pub struct RegistryLinkConfig {
    /// Registry WebSocket URL.
    pub url: String,

    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,

    /// WebSocket dial timeout.
    pub connect_timeout: Duration,

    /// How long a lookup waits for its response.
    pub request_timeout: Duration,

    /// Outbound frame queue depth.
    pub outbound_capacity: usize,

    /// Per-waiter response queue depth.
    pub waiter_capacity: usize,
}

impl Default for RegistryLinkConfig {
    fn default() -> Self {
        RegistryLinkConfig {
            url: String::new(),
            reconnect_delay: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_millis(3000),
            outbound_capacity: 10,
            waiter_capacity: 1,
        }
    }
}

// =============================================================================
// Registry Link Handle
// =============================================================================

/// Cloneable handle for issuing requests and notifications.
#[derive(Clone)]
pub struct RegistryLink {
    outbound_tx: mpsc::Sender<String>,
    pending: Arc<PendingTable<RegistryResponse>>,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl RegistryLink {
    /// Creates the handle and the connection that serves it.
    ///
    /// Nothing is dialled until [`RegistryConnection::run`] is polled.
    pub fn new(config: RegistryLinkConfig, cancel: CancellationToken) -> (Self, RegistryConnection) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let pending = PendingTable::new(config.waiter_capacity);

        let link = RegistryLink {
            outbound_tx,
            pending: Arc::clone(&pending),
            request_timeout: config.request_timeout,
            cancel: cancel.clone(),
        };
        let connection = RegistryConnection {
            health: LinkHealth::new(config.url.clone()),
            config,
            outbound_rx,
            pending,
            cancel,
        };
        (link, connection)
    }

    /// Creates the link and spawns its connection task.
    pub fn spawn(config: RegistryLinkConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (link, connection) = Self::new(config, cancel);
        let handle = tokio::spawn(connection.run());
        (link, handle)
    }

    /// Sends a correlated request and waits for the matching response.
    ///
    /// Callers sharing a key share one wire request and all receive the same
    /// response. A timeout fails this caller only.
    pub async fn request(
        &self,
        key: &str,
        payload: &RegistryRequest,
        timeout: Duration,
    ) -> BridgeResult<RegistryResponse> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let (mut waiter, created) = self.pending.attach(key, timeout);
        if created {
            let frame = match payload.to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    waiter.abandon();
                    return Err(e);
                }
            };
            match self.outbound_tx.try_send(frame) {
                Ok(()) => debug!(key, "Registry request queued"),
                Err(TrySendError::Full(_)) => {
                    warn!(key, "Registry outbound queue full, request dropped");
                    waiter.abandon();
                    return Err(BridgeError::QueueFull);
                }
                Err(TrySendError::Closed(_)) => {
                    waiter.abandon();
                    return Err(BridgeError::ChannelError("registry link stopped".into()));
                }
            }
        } else {
            debug!(key, "Coalesced with pending registry request");
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(BridgeError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(BridgeError::RequestTimeout {
                key: key.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            response = waiter.recv() => response.ok_or_else(|| {
                BridgeError::ChannelError(format!("pending entry for {} dropped", key))
            }),
        }
    }

    /// Queues a one-way frame. At-most-once: a full queue drops it.
    pub fn notify(&self, payload: &RegistryRequest) -> BridgeResult<()> {
        let frame = payload.to_json()?;
        match self.outbound_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    facility = payload.facility,
                    number = payload.number,
                    "Registry outbound queue full, notification dropped"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(BridgeError::ChannelError("registry link stopped".into()))
            }
        }
    }

    /// Lookup timeout used by [`CorrelatedRequester::fetch_identity`].
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Waiters currently attached to `key`.
    pub fn pending_waiters(&self, key: &str) -> usize {
        self.pending.waiters(key)
    }
}

#[async_trait]
impl CorrelatedRequester for RegistryLink {
    async fn fetch_identity(&self, card: CardNumber) -> BridgeResult<IdentityRecord> {
        let key = card.correlation_key();
        let response = self
            .request(&key, &RegistryRequest::lookup(card), self.request_timeout)
            .await?;
        Ok(response.into_identity(card))
    }

    async fn push_status(
        &self,
        card: CardNumber,
        status: &StatusMessage,
        cabin: u32,
    ) -> BridgeResult<()> {
        self.notify(&RegistryRequest::status(card, status, cabin))
    }
}

// =============================================================================
// Registry Connection
// =============================================================================

/// Owns the socket: reconnect loop, reader and writer.
pub struct RegistryConnection {
    config: RegistryLinkConfig,
    outbound_rx: mpsc::Receiver<String>,
    pending: Arc<PendingTable<RegistryResponse>>,
    cancel: CancellationToken,
    health: LinkHealth,
}

impl RegistryConnection {
    /// Connects and reconnects until cancelled.
    pub async fn run(mut self) {
        info!(url = %self.config.url, "Registry link starting");
        let mut delay = ReconnectDelay::new(self.config.reconnect_delay);

        loop {
            let dialled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = link::connect(&self.config.url, self.config.connect_timeout) => result,
            };

            match dialled {
                Ok(ws_stream) => {
                    self.health.connected();
                    match self.session(ws_stream).await {
                        Ok(()) => break,
                        Err(e) => {
                            self.health.failed(&e);
                        }
                    }
                }
                Err(e) => {
                    self.health.failed(&e);
                }
            }

            if !delay.wait(&self.cancel).await {
                break;
            }
        }

        info!(url = %self.config.url, "Registry link stopped");
    }

    /// Runs the reader and writer until either fails or cancellation.
    ///
    /// `Ok(())` only on cancellation.
    async fn session(&mut self, ws_stream: WsStream) -> BridgeResult<()> {
        let (write, read) = ws_stream.split();
        let write: SharedSink = Arc::new(Mutex::new(write));

        tokio::select! {
            _ = self.cancel.cancelled() => {
                let _ = write.lock().await.send(WsMessage::Close(None)).await;
                Ok(())
            }
            result = write_loop(&mut self.outbound_rx, Arc::clone(&write)) => result,
            result = read_loop(read, &self.pending, Arc::clone(&write)) => result,
        }
    }
}

/// Drains the outbound queue onto the wire.
async fn write_loop(outbound_rx: &mut mpsc::Receiver<String>, write: SharedSink) -> BridgeResult<()> {
    while let Some(frame) = outbound_rx.recv().await {
        debug!(bytes = frame.len(), "Sending registry frame");
        write.lock().await.send(WsMessage::Text(frame.into())).await?;
    }
    Err(BridgeError::ChannelError("outbound queue closed".into()))
}

/// Reads frames until the socket fails or closes.
async fn read_loop(
    mut read: SplitStream<WsStream>,
    pending: &PendingTable<RegistryResponse>,
    write: SharedSink,
) -> BridgeResult<()> {
    loop {
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => dispatch(pending, &text),
            Some(Ok(WsMessage::Ping(data))) => {
                write.lock().await.send(WsMessage::Pong(data)).await?;
            }
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(?frame, "Registry closed the connection");
                return Err(BridgeError::Disconnected);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(BridgeError::from(e)),
            None => return Err(BridgeError::Disconnected),
        }
    }
}

/// Routes one inbound frame to its waiters. Bad frames are skipped.
fn dispatch(pending: &PendingTable<RegistryResponse>, text: &str) {
    let response = match RegistryResponse::from_json(text) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Skipping malformed registry frame");
            return;
        }
    };

    if response.correlation_id.is_empty() {
        debug!("Registry frame without correlation id");
        return;
    }

    let key = response.correlation_id.clone();
    let delivered = pending.resolve(&key, response);
    debug!(key = %key, delivered, "Registry response dispatched");
}
