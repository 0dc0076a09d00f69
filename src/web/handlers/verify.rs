//! Reverse-proxy access check.
//!
//! The front proxy calls this before serving a private file from disk and
//! forwards the user headers on success.

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::web::dto::VerifyQuery;
use crate::web::error::ApiError;

use super::AppState;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_NAME: &str = "x-user-name";
pub const HEADER_CACHE_HIT: &str = "x-cache-hit";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Token from the query, then `Authorization` (bearer or raw), then `X-Token`.
fn find_token(query: &VerifyQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    if let Some(auth) = header_str(headers, AUTHORIZATION.as_str()) {
        let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    header_str(headers, "x-token").map(str::to_string)
}

/// Path from the query, then `X-Path`, then `X-Original-URI`.
fn find_path(query: &VerifyQuery, headers: &HeaderMap) -> Option<String> {
    query
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .or_else(|| header_str(headers, "x-path"))
        .or_else(|| header_str(headers, "x-original-uri"))
        .map(str::to_string)
}

/// GET /api/verify-token - Check a token against a stored file path.
///
/// 200 with `X-User-ID`, `X-User-Name` and `X-Cache-Hit` on success, 401
/// for a bad token, 403 when the token's owner may not read the file.
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = find_token(&query, &headers).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let path = find_path(&query, &headers).ok_or_else(|| ApiError::bad_request("Missing path"))?;

    let access = state.verifier.verify_access(&token, &path).await?;

    let user_name = HeaderValue::from_str(&access.user_name)
        .map_err(|_| ApiError::internal("Invalid user name header"))?;
    let mut response = StatusCode::OK.into_response();
    let out = response.headers_mut();
    out.insert(
        HeaderName::from_static(HEADER_USER_ID),
        HeaderValue::from(access.user_id),
    );
    out.insert(HeaderName::from_static(HEADER_USER_NAME), user_name);
    out.insert(
        HeaderName::from_static(HEADER_CACHE_HIT),
        HeaderValue::from_static(if access.cache_hit { "true" } else { "false" }),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_token_precedence() {
        let query = VerifyQuery {
            token: Some("from-query".to_string()),
            path: None,
        };
        let h = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(find_token(&query, &h).as_deref(), Some("from-query"));

        let empty = VerifyQuery::default();
        assert_eq!(find_token(&empty, &h).as_deref(), Some("from-header"));

        let raw = headers(&[("authorization", "rawtoken")]);
        assert_eq!(find_token(&empty, &raw).as_deref(), Some("rawtoken"));

        let x = headers(&[("x-token", "xtoken")]);
        assert_eq!(find_token(&empty, &x).as_deref(), Some("xtoken"));

        assert_eq!(find_token(&empty, &HeaderMap::new()), None);
    }

    #[test]
    fn test_path_sources() {
        let empty = VerifyQuery::default();
        let h = headers(&[
            ("x-path", "/private/user_1/a.pdf"),
            ("x-original-uri", "/private/user_1/b.pdf"),
        ]);
        assert_eq!(find_path(&empty, &h).as_deref(), Some("/private/user_1/a.pdf"));

        let h = headers(&[("x-original-uri", "/private/user_1/b.pdf?x=1")]);
        assert_eq!(
            find_path(&empty, &h).as_deref(),
            Some("/private/user_1/b.pdf?x=1")
        );
    }
}
