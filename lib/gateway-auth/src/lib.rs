//! JWT validation and excluded-path matching for the gateway.

pub mod exclusion;
pub mod validator;

pub use exclusion::PathExclusions;
pub use validator::{Claims, JwtValidator, TokenType};
