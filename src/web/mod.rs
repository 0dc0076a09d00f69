//! Web API for imghost.
//!
//! A thin axum layer over the core: JSON handlers for accounts, files,
//! tokens and role administration, plus the reverse-proxy verification
//! endpoint.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
