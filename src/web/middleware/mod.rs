//! Middleware for the web API.

pub mod auth;
pub mod cors;

pub use auth::{authorize, bearer_token, AuthUser, JwtClaims, JwtState};
pub use cors::create_cors_layer;
