//! # Kiosk Link
//!
//! One persistent WebSocket per kiosk. Each "newImage" frame names a
//! snapshot; the link decodes the file name, downloads the JPEG from the
//! kiosk's HTTP server and queues a [`RawDeviceEvent`].
//!
//! ## Frame Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reader: text frame ──► frames queue (10) ── full ──► warn, drop        │
//! │     │                   (pings answered here, never behind a download)  │
//! │     ▼                                                                   │
//! │  processor:                                                             │
//! │     │  JSON decode + validate ──── error ──► warn, skip                 │
//! │     │  action != newImage ──────────────────► skip                      │
//! │     │  same filename as previous frame ─────► skip (kiosk double-send)  │
//! │     │  parse filename ───────────── error ──► warn, skip                │
//! │     │  GET http://{host}/static/img/orig/{filename} (2s) ─ error ─► skip│
//! │     ▼                                                                   │
//! │  events queue (20) ── full ──► warn, drop                               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  EventSource::next_event()                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use thermo_core::{CaptureFileName, EndpointDescriptor, RawDeviceEvent};

use crate::error::{BridgeError, BridgeResult};
use crate::link::{self, LinkHealth, ReconnectDelay, SharedSink, WsStream};
use crate::ports::EventSource;
use crate::protocol::KioskFrame;

/// Where kiosks serve their snapshots.
pub const DEFAULT_IMAGE_URL_TEMPLATE: &str = "http://{host}/static/img/orig/{filename}";

/// Raw frames read but not yet decoded.
const FRAME_QUEUE_CAPACITY: usize = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Settings shared by every kiosk link.
#[derive(Debug, Clone)]
pub struct KioskLinkConfig {
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,

    /// WebSocket dial timeout.
    pub connect_timeout: Duration,

    /// Snapshot download timeout.
    pub download_timeout: Duration,

    /// Decoded event queue depth.
    pub event_capacity: usize,

    /// Snapshot URL with `{host}` and `{filename}` placeholders.
    pub image_url_template: String,
}

impl Default for KioskLinkConfig {
    fn default() -> Self {
        KioskLinkConfig {
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_millis(2000),
            event_capacity: 20,
            image_url_template: DEFAULT_IMAGE_URL_TEMPLATE.to_string(),
        }
    }
}

/// Builds the snapshot URL from the kiosk's feed address.
pub fn image_url(endpoint_url: &str, template: &str, file_name: &str) -> BridgeResult<String> {
    let parsed = Url::parse(endpoint_url)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| BridgeError::InvalidUrl(format!("{} has no host", endpoint_url)))?;
    let host = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok(template
        .replace("{host}", &host)
        .replace("{filename}", file_name))
}

// =============================================================================
// Image Fetcher
// =============================================================================

/// Downloads snapshot bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>>;
}

/// HTTP GET with a per-request timeout.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpImageFetcher { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::DownloadFailed(format!("{} returned {}", url, status)));
        }
        let bytes = response.bytes().await?;
        debug!(url, bytes = bytes.len(), "Snapshot downloaded");
        Ok(bytes.to_vec())
    }
}

// =============================================================================
// Frame Decoder
// =============================================================================

/// Turns kiosk frames into capture announcements.
///
/// Remembers the previous file name so that a frame repeated back-to-back
/// is delivered once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    previous: Option<String>,
}

impl FrameDecoder {
    /// `Ok(None)` for frames that are valid but not actionable.
    pub fn decode(&mut self, text: &str) -> BridgeResult<Option<(KioskFrame, CaptureFileName)>> {
        let frame = KioskFrame::from_json(text)?;
        frame.validate()?;

        if !frame.is_new_capture() {
            return Ok(None);
        }
        if self.previous.as_deref() == Some(frame.file_name.as_str()) {
            debug!(file_name = %frame.file_name, "Duplicate capture frame");
            return Ok(None);
        }
        self.previous = Some(frame.file_name.clone());

        let name = CaptureFileName::parse(&frame.file_name)?;
        Ok(Some((frame, name)))
    }
}

// =============================================================================
// Kiosk Link (event source)
// =============================================================================

/// Consumer side of one kiosk: yields decoded events.
pub struct KioskLink {
    descriptor: Arc<EndpointDescriptor>,
    events_rx: Mutex<mpsc::Receiver<RawDeviceEvent>>,
    cancel: CancellationToken,
}

impl KioskLink {
    /// Creates the event source and the connection that feeds it.
    pub fn new(
        descriptor: Arc<EndpointDescriptor>,
        config: KioskLinkConfig,
        fetcher: Arc<dyn ImageFetcher>,
        cancel: CancellationToken,
    ) -> (Self, KioskConnection) {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));

        let connection = KioskConnection {
            health: LinkHealth::new(format!("kiosk {} ({})", descriptor.id, descriptor.url)),
            descriptor: Arc::clone(&descriptor),
            config,
            fetcher,
            events_tx,
            cancel: cancel.clone(),
        };
        let link = KioskLink {
            descriptor,
            events_rx: Mutex::new(events_rx),
            cancel,
        };
        (link, connection)
    }

    /// Connects to a kiosk over HTTP-backed snapshot download.
    pub fn connect(
        descriptor: Arc<EndpointDescriptor>,
        config: KioskLinkConfig,
        cancel: CancellationToken,
    ) -> BridgeResult<(Self, JoinHandle<()>)> {
        let fetcher = Arc::new(HttpImageFetcher::new(config.download_timeout)?);
        let (link, connection) = Self::new(descriptor, config, fetcher, cancel);
        let handle = tokio::spawn(connection.run());
        Ok((link, handle))
    }
}

#[async_trait]
impl EventSource for KioskLink {
    fn descriptor(&self) -> Arc<EndpointDescriptor> {
        Arc::clone(&self.descriptor)
    }

    async fn next_event(&self) -> BridgeResult<RawDeviceEvent> {
        let mut events_rx = self.events_rx.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(BridgeError::Cancelled),
            event = events_rx.recv() => match event {
                Some(event) => Ok(event),
                None if self.cancel.is_cancelled() => Err(BridgeError::Cancelled),
                None => Err(BridgeError::ChannelError(format!(
                    "kiosk {} connection task stopped",
                    self.descriptor.id
                ))),
            },
        }
    }
}

// =============================================================================
// Kiosk Connection
// =============================================================================

/// Producer side of one kiosk: socket, decoder and download.
pub struct KioskConnection {
    descriptor: Arc<EndpointDescriptor>,
    config: KioskLinkConfig,
    fetcher: Arc<dyn ImageFetcher>,
    events_tx: mpsc::Sender<RawDeviceEvent>,
    cancel: CancellationToken,
    health: LinkHealth,
}

impl KioskConnection {
    /// Connects and reconnects until cancelled or the link is dropped.
    pub async fn run(mut self) {
        info!(endpoint_id = self.descriptor.id, url = %self.descriptor.url, "Kiosk link starting");
        let mut delay = ReconnectDelay::new(self.config.reconnect_delay);

        while !self.events_tx.is_closed() {
            let dialled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = link::connect(&self.descriptor.url, self.config.connect_timeout) => result,
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

        info!(endpoint_id = self.descriptor.id, "Kiosk link stopped");
    }

    /// Runs the reader and the processor until the socket fails.
    ///
    /// Frames already read when the socket drops are still processed.
    /// `Ok(())` only on cancellation.
    async fn session(&self, ws_stream: WsStream) -> BridgeResult<()> {
        let (write, read) = ws_stream.split();
        let write: SharedSink = Arc::new(Mutex::new(write));
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);

        let pipeline = async {
            let (read_result, process_result) = tokio::join!(
                self.read_frames(read, Arc::clone(&write), frames_tx),
                self.process_frames(frames_rx)
            );
            process_result.and(read_result)
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {
                let _ = write.lock().await.send(WsMessage::Close(None)).await;
                Ok(())
            }
            result = pipeline => result,
        }
    }

    /// Reads the socket and queues text frames. Never waits on a download.
    async fn read_frames(
        &self,
        mut read: SplitStream<WsStream>,
        write: SharedSink,
        frames_tx: mpsc::Sender<String>,
    ) -> BridgeResult<()> {
        let endpoint_id = self.descriptor.id;

        loop {
            let message = tokio::select! {
                _ = frames_tx.closed() => {
                    return Err(BridgeError::ChannelError("kiosk frame processor stopped".into()));
                }
                message = read.next() => message,
            };

            match message {
                Some(Ok(WsMessage::Text(text))) => match frames_tx.try_send(text.to_string()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(endpoint_id, "Kiosk frame queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        return Err(BridgeError::ChannelError("kiosk frame processor stopped".into()));
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    write.lock().await.send(WsMessage::Pong(data)).await?;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(endpoint_id, ?frame, "Kiosk closed the connection");
                    return Err(BridgeError::Disconnected);
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!(endpoint_id, bytes = data.len(), "Skipping non-text kiosk frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(BridgeError::from(e)),
                None => return Err(BridgeError::Disconnected),
            }
        }
    }

    /// Decodes queued frames until the reader hangs up.
    ///
    /// Duplicate suppression starts afresh with every connection.
    async fn process_frames(&self, mut frames_rx: mpsc::Receiver<String>) -> BridgeResult<()> {
        let mut decoder = FrameDecoder::default();
        while let Some(text) = frames_rx.recv().await {
            self.handle_text(&mut decoder, &text).await?;
        }
        Ok(())
    }

    /// Decodes one frame and queues the event. Only a closed queue is fatal.
    async fn handle_text(&self, decoder: &mut FrameDecoder, text: &str) -> BridgeResult<()> {
        let endpoint_id = self.descriptor.id;

        let (frame, name) = match decoder.decode(text) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(endpoint_id, error = %e, frame = text, "Skipping kiosk frame");
                return Ok(());
            }
        };

        let url = match image_url(&self.descriptor.url, &self.config.image_url_template, &frame.file_name) {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint_id, error = %e, "Cannot build snapshot URL");
                return Ok(());
            }
        };

        let image = match self.fetcher.fetch(&url).await {
            Ok(image) => image,
            Err(e) => {
                warn!(endpoint_id, url = %url, error = %e, "Snapshot not downloaded");
                return Ok(());
            }
        };

        let event = RawDeviceEvent {
            captured_at: name.captured_at,
            temperature: name.temperature,
            card: name.card,
            file_name: frame.file_name,
            image,
        };

        match self.events_tx.try_send(event) {
            Ok(()) => {
                debug!(endpoint_id, card = %name.card, temperature = name.temperature, "Kiosk event queued");
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                warn!(endpoint_id, file_name = %event.file_name, "Kiosk event queue full, event dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(BridgeError::ChannelError("kiosk event receiver dropped".into()))
            }
        }
    }
}
