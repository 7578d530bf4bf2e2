//! # chorus-database
//!
//! PostgreSQL connection management, embedded migrations, and the user and
//! session repositories. Every repository is a trait with a Postgres
//! implementation and an in-memory one for tests and ephemeral runs.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::{
    MemorySessionRepository, MemoryUserRepository, PgSessionRepository, PgUserRepository,
    SessionRepository, UserRepository,
};
