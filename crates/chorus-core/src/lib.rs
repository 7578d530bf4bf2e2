//! # chorus-core
//!
//! Core crate for Chorus. Contains the layered configuration schema,
//! typed identifiers, the cache provider abstraction, response envelopes,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other Chorus crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
