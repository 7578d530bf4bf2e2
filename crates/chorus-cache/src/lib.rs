//! # chorus-cache
//!
//! Cache provider implementations for Chorus:
//!
//! - **memory**: in-process cache using [moka](https://crates.io/crates/moka)
//!   with per-entry TTLs, plus TTL-bounded lists
//! - **redis**: Redis-backed cache using the [redis](https://crates.io/crates/redis)
//!   crate, with Lua scripts for the multi-key operations
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
