//! CORS middleware configuration.

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::web::handlers::verify::{HEADER_CACHE_HIT, HEADER_USER_ID, HEADER_USER_NAME};

fn exposed_headers() -> [HeaderName; 3] {
    [
        HeaderName::from_static(HEADER_USER_ID),
        HeaderName::from_static(HEADER_USER_NAME),
        HeaderName::from_static(HEADER_CACHE_HIT),
    ]
}

fn permissive(methods: [Method; 5]) -> CorsLayer {
    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(Any)
        .allow_origin(Any)
        .expose_headers(exposed_headers())
}

/// Create a CORS layer from configuration.
///
/// With no configured origins any origin is allowed, without credentials.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let parsed_origins: Vec<HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed_origins.is_empty() {
        return permissive(methods);
    }

    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-token"),
            HeaderName::from_static("x-path"),
        ])
        .expose_headers(exposed_headers())
        .allow_credentials(true)
        .allow_origin(parsed_origins)
}
