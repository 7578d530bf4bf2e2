//! JWT token encoding, decoding, and claims.

pub mod claims;
pub mod decoder;
pub mod encoder;

pub use claims::{Claims, TokenType};
pub use decoder::{JwtDecoder, TokenRejection};
pub use encoder::JwtEncoder;
