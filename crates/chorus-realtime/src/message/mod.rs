//! Socket wire frames.

pub mod types;

pub use types::{InboundFrame, OutboundMessage};
