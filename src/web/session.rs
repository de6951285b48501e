use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::{DbError, SessionRepo, User, UserRepo};
use crate::server::AppState;

pub const SESSION_COOKIE: &str = "sessionid";

/// The logged in user, set by `load_session`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Site cookie: whole-site path, `SameSite=Lax`, and `Secure` when the
/// site is served over TLS.
pub fn build_cookie(name: &'static str, value: String, http_only: bool, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Lax)
        .http_only(http_only)
        .secure(secure)
        .build()
}

/// Cookie that makes the browser drop `name`.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// Session tokens are stored hashed.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

async fn lookup(state: &AppState, token: &str) -> Result<User, DbError> {
    let token_hash = hash_token(token);
    let session = state.db.get_session(&token_hash).await?;

    let last_seen = session.lastused.or(session.created);
    let cutoff = Utc::now() - state.config.session_max_idle();
    if last_seen.map_or(true, |t| t < cutoff) {
        state.db.delete_session(&token_hash).await?;
        return Err(DbError::NotFound("Session expired".to_string()));
    }

    state.db.get_user_by_id(&session.user_id).await
}

pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match lookup(&state, cookie.value()).await {
            Ok(user) => {
                req.extensions_mut().insert(CurrentUser(user));
            }
            Err(DbError::NotFound(e)) => debug!("Ignoring session cookie: {}", e),
            Err(e) => warn!("Failed to load session: {}", e),
        }
    }

    next.run(req).await
}
