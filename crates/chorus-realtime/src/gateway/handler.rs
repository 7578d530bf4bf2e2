//! Extension point for events owned by other subsystems.

use std::sync::Arc;

use async_trait::async_trait;

use chorus_core::result::AppResult;

use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::fanout::FanoutAdapter;
use crate::message::InboundFrame;
use crate::presence::PresenceStore;

/// What a handler may touch while processing one frame.
#[derive(Clone)]
pub struct EventContext {
    /// The connection that sent the frame.
    pub connection: Arc<ConnectionHandle>,
    pub presence: Arc<dyn PresenceStore>,
    pub fanout: Arc<FanoutAdapter>,
    /// Live connections of this process, for direct delivery by user or
    /// username.
    pub pool: Arc<ConnectionPool>,
}

/// A handler for one named event, registered on the gateway.
///
/// The returned value becomes the `data` of the ack when the frame carried a
/// `request_id`. Errors are turned into error replies by the gateway.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &EventContext, frame: &InboundFrame) -> AppResult<serde_json::Value>;
}
