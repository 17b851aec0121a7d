//! Request extractors for the signed-in user and the request timestamp.

use super::AppState;
use super::pages::PageError;
use crate::auth::SESSION_COOKIE;
use crate::error::ApiError;
use crate::types::User;
use axum::extract::{FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Local};
use std::convert::Infallible;

/// Local time the request arrived, stamped by [`stamp_request_time`].
#[derive(Debug, Clone, Copy)]
pub struct RequestTime(pub DateTime<Local>);

/// Middleware recording when each request arrived.
pub async fn stamp_request_time(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(RequestTime(Local::now()));
    next.run(req).await
}

/// Read a cookie value from the request headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Resolve the caller from an `Authorization: Token <key>` header or the
/// session cookie.
fn resolve_user(parts: &Parts, state: &AppState) -> Result<Option<User>, ApiError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let key = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Token "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiError::invalid_token("Invalid token header."))?;
        return state
            .db()
            .token_user(key)?
            .map(Some)
            .ok_or_else(|| ApiError::invalid_token("Invalid token."));
    }

    match cookie_value(&parts.headers, SESSION_COOKIE) {
        Some(key) => Ok(state.db().session_user(key)?),
        None => Ok(None),
    }
}

/// Authenticated caller for API routes. Rejects with 401.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state)?
            .map(CurrentUser)
            .ok_or_else(ApiError::not_authenticated)
    }
}

/// Signed-in user for HTML pages. Redirects anonymous visitors to the login
/// page with a `next` parameter.
pub struct LoginRequired(pub User);

impl FromRequestParts<AppState> for LoginRequired {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, state) {
            Ok(Some(user)) => Ok(LoginRequired(user)),
            Err(e) if e.code.status().is_server_error() => {
                Err(PageError::from(e).into_response())
            }
            Ok(None) | Err(_) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                let target = format!("/user/login?next={}", urlencoding::encode(next));
                Err(Redirect::to(&target).into_response())
            }
        }
    }
}

/// The caller if signed in, for pages open to everyone.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // A stale token header should not lock anyone out of the login page
        match resolve_user(parts, state) {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                if e.code.status().is_server_error() {
                    tracing::error!(code = ?e.code, message = %e.message, "Failed to resolve user");
                }
                Ok(MaybeUser(None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let (parts, _) = HttpRequest::builder()
            .uri("/tasks")
            .header(COOKIE, cookie)
            .body(())
            .unwrap()
            .into_parts();
        parts.headers
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let headers = headers_with_cookie("theme=dark; sessionid=abc123; lang=en");
        assert_eq!(cookie_value(&headers, "sessionid"), Some("abc123"));
        assert_eq!(cookie_value(&headers, "lang"), Some("en"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_names_match_exactly() {
        let headers = headers_with_cookie("xsessionid=nope");
        assert_eq!(cookie_value(&headers, "sessionid"), None);
    }
}
