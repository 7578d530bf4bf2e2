//! The connection gateway: handshake, frame dispatch and teardown.

pub mod events;
pub mod handler;
pub mod service;

pub use handler::{EventContext, EventHandler};
pub use service::{ClientInfo, Gateway, GatewayComponents};
