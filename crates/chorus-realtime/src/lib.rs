//! # chorus-realtime
//!
//! Real-time socket engine for Chorus:
//!
//! - authenticated connection lifecycle with heartbeat and activity touch
//! - process-local presence: connections, groups, rooms and the
//!   at-most-one-group/room invariant
//! - online/offline tracking across a user's tabs
//! - cross-process fanout of broadcast keys over a pub/sub backend
//!
//! Presence state lives in the process that accepted the connection. A
//! deployment running several processes routes each connection to one
//! process for its lifetime; the fanout adapter carries broadcasts between
//! processes.

pub mod channel;
pub mod connection;
pub mod fanout;
pub mod gateway;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod server;

pub use channel::ChannelRegistry;
pub use connection::{ConnectionHandle, ConnectionPool};
pub use fanout::FanoutAdapter;
pub use gateway::{EventContext, EventHandler, Gateway};
pub use metrics::{RealtimeMetrics, RealtimeMetricsSnapshot};
pub use presence::{MemoryPresenceStore, OnlineTracker, PresenceStore};
pub use server::RealtimeEngine;
