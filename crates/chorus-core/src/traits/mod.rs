//! Core traits defined in `chorus-core` and implemented by other crates.

pub mod cache;

pub use cache::{CacheOp, CacheProvider};
