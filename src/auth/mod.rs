//! Access-token lookup.
//!
//! Signing in happens elsewhere; this module only reads what that step left
//! behind, or a token handed over through the environment.

pub mod token;
pub mod token_store;

pub use token::TokenSet;
pub use token_store::{ACCESS_TOKEN_ENV, FileTokenStore, TokenStore};
