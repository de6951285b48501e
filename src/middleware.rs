use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::web::routes::with_slash;

pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let content_length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    info!(
        method = %method,
        url = %uri,
        status = status,
        length = content_length,
        "HTTP request"
    );

    response
}

/// Unmatched GETs for paths that name a route once a slash is appended
/// get a 301 there, everything else is a 404.
pub async fn fallback(req: Request) -> Response {
    let uri = req.uri();
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(path) = with_slash(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let target = match uri.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path,
    };
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, target)]).into_response()
}
