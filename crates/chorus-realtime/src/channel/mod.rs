//! Broadcast-key subscriptions of local connections.

pub mod registry;

pub use registry::ChannelRegistry;

/// Key every connection is subscribed to for online/offline frames.
pub const PRESENCE_KEY: &str = "presence";
