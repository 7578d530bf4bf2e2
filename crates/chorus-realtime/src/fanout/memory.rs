//! In-process pub/sub for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use chorus_core::error::AppError;
use chorus_core::result::AppResult;

use super::backend::FanoutBackend;

/// Broadcast channels keyed by name.
///
/// Several adapters sharing one instance behave like several processes
/// sharing one pub/sub server.
#[derive(Debug)]
pub struct MemoryFanoutBackend {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    buffer_size: usize,
    available: AtomicBool,
}

impl MemoryFanoutBackend {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer_size,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the transport going away and coming back. Going away ends
    /// every open subscription.
    pub async fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.channels.write().await.clear();
        }
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::service_unavailable("Fanout transport unavailable"))
        }
    }
}

impl Default for MemoryFanoutBackend {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl FanoutBackend for MemoryFanoutBackend {
    async fn publish(&self, channel: &str, payload: String) -> AppResult<()> {
        self.ensure_available()?;
        if let Some(tx) = self.channels.read().await.get(channel) {
            // No receivers is not an error for pub/sub.
            let _ = tx.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>> {
        self.ensure_available()?;
        let rx = self
            .channels
            .write()
            .await
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe();

        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Fanout subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
