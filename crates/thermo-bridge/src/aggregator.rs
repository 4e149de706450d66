//! # Event Aggregator
//!
//! Fans the readings of every kiosk into one bounded queue for the
//! orchestrator.
//!
//! ## Supervision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  kiosk 1 ──► pump ──┐                                                   │
//! │  kiosk 2 ──► pump ──┼──► try_send ──► events (10) ──► Orchestrator      │
//! │  kiosk N ──► pump ──┘       │                                           │
//! │                             └── full: warn, drop                        │
//! │                                                                         │
//! │  One pump per source in a JoinSet. If any pump fails with anything      │
//! │  other than cancellation the whole set is aborted and started again     │
//! │  after `restart_delay`. Cancellation ends the group cleanly.            │
//! │                                                                         │
//! │  Order is kept per kiosk, not across kiosks.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thermo_core::AggregatedEvent;

use crate::error::{BridgeError, BridgeResult};
use crate::link::ReconnectDelay;
use crate::ports::EventSource;

/// Aggregator settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Merged queue depth.
    pub capacity: usize,

    /// Pause before restarting a failed group.
    pub restart_delay: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            capacity: 10,
            restart_delay: Duration::from_millis(1000),
        }
    }
}

/// Supervises one pump task per event source.
pub struct Aggregator {
    sources: Vec<Arc<dyn EventSource>>,
    events_tx: mpsc::Sender<AggregatedEvent>,
    restart_delay: Duration,
    cancel: CancellationToken,
}

impl Aggregator {
    /// Creates the aggregator and the receiving end of its merged queue.
    pub fn new(
        sources: Vec<Arc<dyn EventSource>>,
        config: AggregatorConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<AggregatedEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.capacity.max(1));
        let aggregator = Aggregator {
            sources,
            events_tx,
            restart_delay: config.restart_delay,
            cancel,
        };
        (aggregator, events_rx)
    }

    /// Runs until cancelled or the consumer goes away.
    pub async fn run(self) {
        info!(sources = self.sources.len(), "Aggregator starting");
        let mut delay = ReconnectDelay::new(self.restart_delay);

        loop {
            match self.run_group().await {
                Ok(()) => break,
                Err(e) if e.is_cancelled() => break,
                Err(_) if self.events_tx.is_closed() => {
                    info!("Event consumer gone");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Event source failed, restarting all sources");
                }
            }

            if !delay.wait(&self.cancel).await {
                break;
            }
        }

        info!("Aggregator stopped");
    }

    /// Runs one generation of pumps. Returns the first non-cancel failure.
    async fn run_group(&self) -> BridgeResult<()> {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            tasks.spawn(pump(
                Arc::clone(source),
                self.events_tx.clone(),
                self.cancel.clone(),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) if e.is_cancelled() => continue,
                Ok(Err(e)) => e,
                Err(join_error) => BridgeError::Internal(join_error.to_string()),
            };
            tasks.abort_all();
            return Err(failure);
        }

        // Every pump ended on cancellation (or there were none).
        self.cancel.cancelled().await;
        Ok(())
    }
}

/// Moves events from one source to the merged queue.
async fn pump(
    source: Arc<dyn EventSource>,
    events_tx: mpsc::Sender<AggregatedEvent>,
    cancel: CancellationToken,
) -> BridgeResult<()> {
    let endpoint = source.descriptor();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = source.next_event() => event?,
        };

        match events_tx.try_send(AggregatedEvent::new(Arc::clone(&endpoint), event)) {
            Ok(()) => debug!(endpoint_id = endpoint.id, "Event aggregated"),
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    endpoint_id = endpoint.id,
                    card = %dropped.card(),
                    "Aggregated queue full, event dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                return Err(BridgeError::ChannelError("aggregated event receiver dropped".into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::testing;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use thermo_core::{CardNumber, EndpointDescriptor, RawDeviceEvent};

    fn raw_event(card: u32, temperature: f64) -> RawDeviceEvent {
        testing::raw_event(CardNumber::from_raw(card), temperature)
    }

    /// Replays a script of results, then waits forever.
    struct ScriptedSource {
        descriptor: Arc<EndpointDescriptor>,
        script: Mutex<VecDeque<BridgeResult<RawDeviceEvent>>>,
        served: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(id: u32, script: Vec<BridgeResult<RawDeviceEvent>>) -> Arc<Self> {
            Arc::new(ScriptedSource {
                descriptor: testing::endpoint(id),
                script: Mutex::new(script.into()),
                served: AtomicUsize::new(0),
            })
        }

        fn served(&self) -> usize {
            self.served.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        fn descriptor(&self) -> Arc<EndpointDescriptor> {
            Arc::clone(&self.descriptor)
        }

        async fn next_event(&self) -> BridgeResult<RawDeviceEvent> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => {
                    self.served.fetch_add(1, Ordering::SeqCst);
                    result
                }
                None => std::future::pending().await,
            }
        }
    }

    async fn recv(rx: &mut mpsc::Receiver<AggregatedEvent>) -> AggregatedEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no aggregated event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_merges_sources_keeping_per_source_order() {
        let a = ScriptedSource::new(1, vec![Ok(raw_event(11, 36.1)), Ok(raw_event(12, 36.2))]);
        let b = ScriptedSource::new(2, vec![Ok(raw_event(21, 36.3))]);
        let cancel = CancellationToken::new();
        let (aggregator, mut rx) = Aggregator::new(
            vec![a.clone() as Arc<dyn EventSource>, b.clone() as Arc<dyn EventSource>],
            AggregatorConfig::default(),
            cancel.clone(),
        );
        let task = tokio::spawn(aggregator.run());

        let mut from_a = Vec::new();
        let mut from_b = Vec::new();
        for _ in 0..3 {
            let event = recv(&mut rx).await;
            match event.endpoint.id {
                1 => from_a.push(event.card().raw()),
                2 => from_b.push(event.card().raw()),
                other => panic!("unexpected endpoint {}", other),
            }
        }
        assert_eq!(from_a, vec![11, 12]);
        assert_eq!(from_b, vec![21]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_restarts_whole_group() {
        let a = ScriptedSource::new(
            1,
            vec![
                Ok(raw_event(11, 36.1)),
                Err(BridgeError::Disconnected),
                Ok(raw_event(12, 36.2)),
            ],
        );
        let b = ScriptedSource::new(2, vec![Ok(raw_event(21, 36.3))]);
        let cancel = CancellationToken::new();
        let (aggregator, mut rx) = Aggregator::new(
            vec![a.clone() as Arc<dyn EventSource>, b.clone() as Arc<dyn EventSource>],
            AggregatorConfig::default(),
            cancel.clone(),
        );
        tokio::spawn(aggregator.run());

        let mut cards = Vec::new();
        for _ in 0..3 {
            cards.push(recv(&mut rx).await.card().raw());
        }
        cards.sort();
        assert_eq!(cards, vec![11, 12, 21]);
        assert_eq!(a.served(), 3);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let a = ScriptedSource::new(
            1,
            vec![Ok(raw_event(1, 36.0)), Ok(raw_event(2, 36.0)), Ok(raw_event(3, 36.0))],
        );
        let cancel = CancellationToken::new();
        let config = AggregatorConfig {
            capacity: 1,
            ..Default::default()
        };
        let (aggregator, mut rx) = Aggregator::new(vec![a.clone() as Arc<dyn EventSource>], config, cancel.clone());
        tokio::spawn(aggregator.run());

        while a.served() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(recv(&mut rx).await.card().raw(), 1);
        assert!(rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancel_stops_cleanly() {
        let a = ScriptedSource::new(1, vec![Err(BridgeError::Cancelled)]);
        let cancel = CancellationToken::new();
        let (aggregator, _rx) = Aggregator::new(vec![a as Arc<dyn EventSource>], AggregatorConfig::default(), cancel.clone());
        let task = tokio::spawn(aggregator.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
