//! Authentication for riders and captains
//!
//! - Email/password registration and login
//! - JWT token generation and validation
//! - Logout through a hashed-token blacklist

mod jwt;
mod password;
mod service;

pub use jwt::{generate_token, verify_token, Claims, JwtError};
pub use service::{blacklist_purger, hash_token, AuthError, AuthService, Principal};
