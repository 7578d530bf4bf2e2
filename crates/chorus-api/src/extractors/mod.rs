//! Custom Axum extractors.

pub mod auth;
pub mod client;
pub mod json;

pub use auth::AuthUser;
pub use client::ClientMeta;
pub use json::ValidatedJson;
