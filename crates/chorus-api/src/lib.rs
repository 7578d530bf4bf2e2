//! # chorus-api
//!
//! HTTP layer for Chorus built on Axum: the `/auth/*` routes, the `/ws`
//! socket upgrade and `/health`, plus the extractors, DTOs and error mapping
//! they share.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
