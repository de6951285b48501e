pub mod accounts;
pub mod api;
pub mod csrf;
pub mod html;
pub mod pages;
pub mod routes;
pub mod session;
pub mod types;

use std::fmt::Display;

use axum::http::StatusCode;
use tracing::error;

use crate::db::DbError;

pub use routes::{reverse, ROUTES};

pub(crate) fn internal_error<E: Display>(e: E) -> StatusCode {
    error!("Internal error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Missing rows are a 404, anything else a 500.
pub(crate) fn db_status(e: DbError) -> StatusCode {
    match e {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::AlreadyExists(_) => StatusCode::CONFLICT,
        DbError::InvalidGenre(_) => StatusCode::BAD_REQUEST,
        e => internal_error(e),
    }
}
