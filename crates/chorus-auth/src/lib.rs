//! # chorus-auth
//!
//! Authentication and session lifecycle for Chorus.
//!
//! ## Modules
//!
//! - `jwt`: HS256 token encoding and validation
//! - `password`: Argon2id hashing and strength policy
//! - `token`: access/refresh issuance, single-use rotation, per-user cap
//! - `session`: durable session records mirrored into the cache
//! - `account`: register, login, logout and password-change flows

pub mod account;
pub mod jwt;
pub mod password;
pub mod session;
pub mod token;

pub use account::AccountService;
pub use jwt::{Claims, JwtDecoder, JwtEncoder, TokenRejection, TokenType};
pub use password::{PasswordHasher, PasswordValidator};
pub use session::SessionRegistry;
pub use token::TokenService;
