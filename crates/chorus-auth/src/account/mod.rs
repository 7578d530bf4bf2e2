//! Account flows built on the token service and session registry.

pub mod service;

pub use service::{AccountService, AuthOutcome, RegisterInput};
