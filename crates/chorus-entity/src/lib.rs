//! # chorus-entity
//!
//! Domain entity models for Chorus. Durable records (users, sessions)
//! derive `sqlx::FromRow`; cache records and process-local presence
//! state are plain serde value types.

pub mod presence;
pub mod session;
pub mod user;
