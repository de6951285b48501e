//! Double submit CSRF protection.
//!
//! Every visitor gets a `csrftoken` cookie. Requests with an unsafe method
//! must send the same value back, either in the `X-CSRFToken` header or in
//! the `csrfmiddlewaretoken` field of a urlencoded form.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::warn;

use super::session::{build_cookie, new_token};
use crate::server::AppState;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: &str = "x-csrftoken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

const MAX_FORM_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

pub async fn get_csrf_token(Extension(token): Extension<CsrfToken>) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse { csrf_token: token.0 })
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

pub fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Value of `name` in an urlencoded body.
pub fn form_field(body: &[u8], name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    pairs.into_iter().find(|(key, _)| key == name).map(|(_, value)| value)
}

pub async fn csrf_protect(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let cookie = CookieJar::from_headers(req.headers())
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty());

    if !is_safe(req.method()) {
        let Some(ref expected) = cookie else {
            warn!("CSRF cookie not set for {} {}", req.method(), req.uri());
            return StatusCode::FORBIDDEN.into_response();
        };

        let mut submitted = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if submitted.is_none() && is_form(req.headers()) {
            let (parts, body) = req.into_parts();
            let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
                Ok(bytes) => bytes,
                Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
            };
            submitted = form_field(&bytes, CSRF_FIELD);
            req = Request::from_parts(parts, Body::from(bytes));
        }

        if submitted.as_deref() != Some(expected.as_str()) {
            warn!("CSRF token mismatch for {} {}", req.method(), req.uri());
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let (token, is_new) = match cookie {
        Some(token) => (token, false),
        None => (new_token(), true),
    };
    req.extensions_mut().insert(CsrfToken(token.clone()));

    let response = next.run(req).await;

    if is_new {
        // Readable by page scripts, which echo it in the header.
        let cookie = build_cookie(CSRF_COOKIE, token, false, state.config.uses_tls());
        return (CookieJar::new().add(cookie), response).into_response();
    }

    response
}
