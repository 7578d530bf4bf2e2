//! Pub/sub transport contract.

use async_trait::async_trait;
use futures::stream::BoxStream;

use chorus_core::result::AppResult;

/// A pub/sub transport shared by every process of a deployment.
#[async_trait]
pub trait FanoutBackend: Send + Sync + std::fmt::Debug + 'static {
    async fn publish(&self, channel: &str, payload: String) -> AppResult<()>;

    /// Open a subscription. The stream ends when the transport drops it.
    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>>;
}
