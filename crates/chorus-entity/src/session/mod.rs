//! Session and refresh-token entities.

pub mod model;
pub mod token;

pub use model::{CreateSession, Session, SessionSnapshot, UserSessionPointer};
pub use token::{RefreshTokenRecord, TokenPair};
