//! Refresh-token lifecycle.

pub mod service;

pub use service::TokenService;
