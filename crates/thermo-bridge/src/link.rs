//! # Link Plumbing
//!
//! Pieces shared by the kiosk and registry links: the WebSocket dial with a
//! timeout, the fixed reconnect delay and connection-health logging.
//!
//! ## Reconnect Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────┐  connect ok   ┌───────────┐  session error  ┌─────────┐    │
//! │  │ Unknown │ ────────────► │ Connected │ ──────────────► │ Failed  │    │
//! │  └────┬────┘               └───────────┘                 └────┬────┘    │
//! │       │ connect error            ▲                            │         │
//! │       └──────────────────────────┼────────► Failed            │         │
//! │                                  └──── fixed delay, redial ◄──┘         │
//! │                                                                         │
//! │  Only the transitions are logged at info/warn; repeats go to debug.    │
//! │  Every wait selects on the cancellation token.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::{Backoff, Constant};
use futures_util::stream::SplitSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};

/// Client-side WebSocket stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half shared between a session's tasks (pongs, close, frames).
pub type SharedSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Dials `url`, failing after `connect_timeout`.
pub async fn connect(url: &str, connect_timeout: Duration) -> BridgeResult<WsStream> {
    match timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((ws_stream, response))) => {
            debug!(url, status = ?response.status(), "WebSocket handshake complete");
            Ok(ws_stream)
        }
        Ok(Err(e)) => Err(BridgeError::from(e)),
        Err(_) => Err(BridgeError::ConnectTimeout(connect_timeout.as_secs())),
    }
}

// =============================================================================
// Reconnect Delay
// =============================================================================

/// Fixed delay between reconnect attempts.
pub struct ReconnectDelay {
    backoff: Constant,
    delay: Duration,
}

impl ReconnectDelay {
    pub fn new(delay: Duration) -> Self {
        ReconnectDelay {
            backoff: Constant::new(delay),
            delay,
        }
    }

    /// Sleeps for the delay. Returns false if cancelled first.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.backoff.next_backoff().unwrap_or(self.delay);
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

// =============================================================================
// Link Health
// =============================================================================

/// Connection state as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unknown,
    Connected,
    Failed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Unknown => write!(f, "unknown"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// Logs connectivity once per transition.
#[derive(Debug)]
pub struct LinkHealth {
    target: String,
    state: LinkState,
}

impl LinkHealth {
    pub fn new(target: impl Into<String>) -> Self {
        LinkHealth {
            target: target.into(),
            state: LinkState::Unknown,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Records a successful connect. Returns true on a transition.
    pub fn connected(&mut self) -> bool {
        if self.state == LinkState::Connected {
            return false;
        }
        if self.state == LinkState::Failed {
            warn!(link = %self.target, "Link restored");
        } else {
            info!(link = %self.target, "Link connected");
        }
        self.state = LinkState::Connected;
        true
    }

    /// Records a failure. Returns true on a transition.
    pub fn failed(&mut self, error: &BridgeError) -> bool {
        if self.state == LinkState::Failed {
            debug!(link = %self.target, %error, "Link still down");
            return false;
        }
        warn!(link = %self.target, %error, "Link failed");
        self.state = LinkState::Failed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_transitions_only() {
        let mut health = LinkHealth::new("ws://kiosk");
        assert_eq!(health.state(), LinkState::Unknown);

        assert!(health.failed(&BridgeError::Disconnected));
        assert!(!health.failed(&BridgeError::Disconnected));
        assert!(health.connected());
        assert!(!health.connected());
        assert!(health.failed(&BridgeError::ConnectTimeout(10)));
        assert_eq!(health.state(), LinkState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delay_waits_or_cancels() {
        let cancel = CancellationToken::new();
        let mut delay = ReconnectDelay::new(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        assert!(delay.wait(&cancel).await);
        assert!(start.elapsed() >= Duration::from_secs(5));

        cancel.cancel();
        assert!(!delay.wait(&cancel).await);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&format!("ws://{}", addr), Duration::from_secs(2)).await;
        assert!(result.unwrap_err().is_retryable());
    }
}
