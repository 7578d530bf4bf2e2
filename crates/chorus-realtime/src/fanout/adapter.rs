//! Broadcast adapter: local delivery plus cross-process publish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chorus_core::config::realtime::RealtimeConfig;

use super::backend::FanoutBackend;
use crate::channel::ChannelRegistry;
use crate::connection::ConnectionPool;
use crate::message::OutboundMessage;
use crate::metrics::RealtimeMetrics;

/// What travels between processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Node id of the publishing process.
    pub origin: String,
    pub key: String,
    pub message: OutboundMessage,
}

/// Delivers broadcasts to local subscribers and relays them to every other
/// process through a [`FanoutBackend`].
///
/// When the backend is unreachable the adapter keeps delivering locally,
/// reports itself degraded and resubscribes with jittered exponential
/// backoff until the backend comes back.
#[derive(Debug)]
pub struct FanoutAdapter {
    node_id: String,
    channel: String,
    backend: Arc<dyn FanoutBackend>,
    channels: Arc<ChannelRegistry>,
    pool: Arc<ConnectionPool>,
    metrics: Arc<RealtimeMetrics>,
    /// The last publish failed.
    publish_failed: AtomicBool,
    /// The subscriber lost its subscription and has not resubscribed yet.
    subscription_lost: AtomicBool,
    subscribed: watch::Sender<bool>,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl FanoutAdapter {
    pub fn new(
        node_id: impl Into<String>,
        config: &RealtimeConfig,
        backend: Arc<dyn FanoutBackend>,
        channels: Arc<ChannelRegistry>,
        pool: Arc<ConnectionPool>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let backoff_min = Duration::from_millis(config.resubscribe_backoff_min_ms.max(1));
        Self {
            node_id: node_id.into(),
            channel: config.fanout_channel.clone(),
            backend,
            channels,
            pool,
            metrics,
            publish_failed: AtomicBool::new(false),
            subscription_lost: AtomicBool::new(false),
            subscribed: watch::channel(false).0,
            backoff_min,
            backoff_max: Duration::from_millis(config.resubscribe_backoff_max_ms).max(backoff_min),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Degraded while publishes fail or until a lost subscription is back.
    pub fn is_degraded(&self) -> bool {
        self.publish_failed.load(Ordering::SeqCst) || self.subscription_lost.load(Ordering::SeqCst)
    }

    /// Resolves once the cross-process subscription is live.
    pub async fn wait_subscribed(&self) {
        let mut rx = self.subscribed.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|subscribed| *subscribed).await;
    }

    /// Send a message to the local subscribers of `key`. Returns how many
    /// connections accepted it.
    pub fn deliver_local(&self, key: &str, message: &OutboundMessage) -> usize {
        self.channels
            .subscribers(key)
            .into_iter()
            .filter_map(|id| self.pool.get(id))
            .filter(|handle| handle.send(message.clone()))
            .count()
    }

    /// Deliver locally, then relay to the other processes.
    pub async fn broadcast(&self, key: &str, message: OutboundMessage) -> usize {
        let delivered = self.deliver_local(key, &message);
        let envelope = Envelope {
            origin: self.node_id.clone(),
            key: key.to_string(),
            message,
        };
        match serde_json::to_string(&envelope) {
            Ok(payload) => self.relay(payload).await,
            Err(e) => warn!(key = %key, error = %e, "Failed to encode fanout envelope"),
        }
        delivered
    }

    /// Broadcast an `event` frame on `key`.
    pub async fn publish(&self, key: &str, event: &str, payload: serde_json::Value) -> usize {
        self.broadcast(key, OutboundMessage::event(key, event, payload))
            .await
    }

    async fn relay(&self, payload: String) {
        match self.backend.publish(&self.channel, payload).await {
            Ok(()) => {
                self.metrics.record_published();
                self.transition("publish succeeded", || {
                    self.publish_failed.store(false, Ordering::SeqCst);
                });
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                self.transition(&e.to_string(), || {
                    self.publish_failed.store(true, Ordering::SeqCst);
                });
            }
        }
    }

    /// Apply `update` to the degradation flags and log when the overall
    /// state flips.
    fn transition(&self, reason: &str, update: impl FnOnce()) {
        let was_degraded = self.is_degraded();
        update();
        match (was_degraded, self.is_degraded()) {
            (false, true) => warn!(
                node_id = %self.node_id,
                reason = %reason,
                "Fanout degraded, delivering to local subscribers only"
            ),
            (true, false) => info!(node_id = %self.node_id, "Fanout recovered"),
            _ => {}
        }
    }

    /// Spawn the subscriber loop.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move { adapter.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            let subscribed = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.backend.subscribe(&self.channel) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    attempt = 0;
                    // A live subscription means the backend is reachable again.
                    self.transition("resubscribed", || {
                        self.subscription_lost.store(false, Ordering::SeqCst);
                        self.publish_failed.store(false, Ordering::SeqCst);
                    });
                    self.subscribed.send_replace(true);
                    info!(node_id = %self.node_id, channel = %self.channel, "Fanout subscribed");

                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                self.subscribed.send_replace(false);
                                return;
                            }
                            next = stream.next() => match next {
                                Some(payload) => self.handle_payload(&payload),
                                None => break,
                            },
                        }
                    }
                    self.transition("subscription closed", || {
                        self.subscription_lost.store(true, Ordering::SeqCst);
                    });
                    self.subscribed.send_replace(false);
                }
                Err(e) => self.transition(&e.to_string(), || {
                    self.subscription_lost.store(true, Ordering::SeqCst);
                }),
            }

            let delay = self.backoff(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, attempt, "Resubscribing to fanout");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(node_id = %self.node_id, "Fanout subscriber stopped");
    }

    fn handle_payload(&self, payload: &str) {
        let envelope: Envelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed fanout envelope");
                return;
            }
        };
        if envelope.origin == self.node_id {
            return;
        }
        self.metrics.record_received();
        self.deliver_local(&envelope.key, &envelope.message);
    }

    /// `min * 2^attempt`, capped, plus up to half of that again as jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .backoff_min
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.backoff_max);
        let half = base.as_millis() as u64 / 2;
        let jitter = Duration::from_millis(rand::random_range(0..=half));
        (base + jitter).min(self.backoff_max)
    }
}
