//! Cross-process delivery of broadcast keys.
//!
//! Every broadcast is delivered to the local subscribers of its key and
//! published once on a shared pub/sub channel. Each process delivers what it
//! receives from that channel to its own subscribers, skipping envelopes it
//! published itself.

pub mod adapter;
pub mod backend;
pub mod memory;
#[cfg(feature = "redis-pubsub")]
pub mod redis_pubsub;

pub use adapter::{Envelope, FanoutAdapter};
pub use backend::FanoutBackend;
pub use memory::MemoryFanoutBackend;
#[cfg(feature = "redis-pubsub")]
pub use redis_pubsub::RedisFanoutBackend;
