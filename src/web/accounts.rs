use std::fmt::Write;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::csrf::{is_form, CsrfToken};
use super::html::{escape, movie_card, preference_controls, Page};
use super::routes::url;
use super::session::{build_cookie, hash_token, new_token, removal_cookie, CurrentUser, SESSION_COOKIE};
use super::types::*;
use super::{db_status, internal_error};
use crate::db::{
    DbError, MovieRepo, MoviePreferences, PreferenceKind, PreferenceRepo, Session, SessionRepo, User, UserRepo,
};
use crate::recommend;
use crate::server::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 150;

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

/// Only same-site paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => url("profile"),
    }
}

fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn account_form(page: &Page, action: &str, fields: &str, next: &str, errors: &[&str], submit: &str) -> String {
    let mut body = format!("<h1>{}</h1>", escape(page.title));
    if !errors.is_empty() {
        body.push_str(r#"<ul class="errors">"#);
        for e in errors {
            let _ = write!(body, "<li>{}</li>", escape(e));
        }
        body.push_str("</ul>");
    }
    let _ = write!(
        body,
        r#"<form method="post" action="{}">{}{}<input type="hidden" name="next" value="{}"><button type="submit">{}</button></form>"#,
        action,
        page.csrf_field(),
        fields,
        escape(next),
        submit
    );
    body
}

fn signup_fields(username: &str) -> String {
    format!(
        r#"<label>Username <input name="username" value="{}" autocomplete="username"></label>
<label>Password <input type="password" name="password1" autocomplete="new-password"></label>
<label>Password again <input type="password" name="password2" autocomplete="new-password"></label>"#,
        escape(username)
    )
}

fn login_fields(username: &str) -> String {
    format!(
        r#"<label>Username <input name="username" value="{}" autocomplete="username"></label>
<label>Password <input type="password" name="password" autocomplete="current-password"></label>"#,
        escape(username)
    )
}

fn account_page(state: &AppState, csrf: &CsrfToken, title: &str, build: impl FnOnce(&Page) -> String) -> Html<String> {
    let page = Page {
        site_name: &state.config.site.name,
        title,
        user: None,
        csrf_token: &csrf.0,
    };
    let body = build(&page);
    page.render(&body)
}

/// Start a session for `user` and redirect to `next`.
async fn start_session(state: &AppState, user: &User, next: &str) -> Result<Response, StatusCode> {
    let token = new_token();
    let now = Utc::now();
    let session = Session {
        token_hash: hash_token(&token),
        user_id: user.id.clone(),
        created: Some(now),
        lastused: Some(now),
    };
    state.db.create_session(&session).await.map_err(internal_error)?;
    if let Err(e) = state.db.touch_login(&user.id).await {
        warn!("Failed to record login for {}: {}", user.username, e);
    }

    let cookie = build_cookie(SESSION_COOKIE, token, true, state.config.uses_tls());
    Ok((CookieJar::new().add(cookie), Redirect::to(next)).into_response())
}

pub async fn signup_page(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    Query(q): Query<NextQuery>,
) -> Html<String> {
    let next = safe_next(q.next.as_deref());
    account_page(&state, &csrf, "Sign up", |page| {
        account_form(page, url("signup"), &signup_fields(""), next, &[], "Sign up")
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    Form(form): Form<SignupForm>,
) -> Result<Response, StatusCode> {
    let username = form.username.trim();
    let next = safe_next(form.next.as_deref()).to_string();

    let mut errors = Vec::new();
    if !valid_username(username) {
        errors.push("Usernames may contain letters, digits and @/./+/-/_ only.".to_string());
    }
    if form.password1.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!("Passwords must be at least {} characters.", MIN_PASSWORD_LEN));
    }
    if form.password1 != form.password2 {
        errors.push("The two passwords do not match.".to_string());
    }
    if errors.is_empty() {
        match state.db.get_user(username).await {
            Ok(_) => errors.push("That username is taken.".to_string()),
            Err(DbError::NotFound(_)) => {}
            Err(e) => return Err(internal_error(e)),
        }
    }
    if !errors.is_empty() {
        let errors: Vec<&str> = errors.iter().map(|s| s.as_str()).collect();
        let html = account_page(&state, &csrf, "Sign up", |page| {
            account_form(page, url("signup"), &signup_fields(username), &next, &errors, "Sign up")
        });
        return Ok((StatusCode::BAD_REQUEST, html).into_response());
    }

    let password = form.password1.clone();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        password: hashed,
        created: Some(Utc::now().to_rfc3339()),
        lastlogin: None,
    };
    match state.db.create_user(&user).await {
        Ok(()) => {}
        Err(DbError::AlreadyExists(_)) => return Err(StatusCode::CONFLICT),
        Err(e) => return Err(internal_error(e)),
    }
    info!("Created user {}", user.username);

    start_session(&state, &user, &next).await
}

pub async fn login_page(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    Query(q): Query<NextQuery>,
) -> Html<String> {
    let next = safe_next(q.next.as_deref());
    account_page(&state, &csrf, "Log in", |page| {
        account_form(page, url("login"), &login_fields(""), next, &[], "Log in")
    })
}

async fn check_password(user: &User, password: &str) -> Result<bool, StatusCode> {
    if user.password.is_empty() {
        return Ok(false);
    }
    let hashed = user.password.clone();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)
}

pub async fn login(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    Form(form): Form<LoginForm>,
) -> Result<Response, StatusCode> {
    let username = form.username.trim();
    let next = safe_next(form.next.as_deref()).to_string();

    let user = match state.db.get_user(username).await {
        Ok(user) => Some(user),
        Err(DbError::NotFound(_)) => None,
        Err(e) => return Err(internal_error(e)),
    };
    if let Some(user) = user {
        if check_password(&user, &form.password).await? {
            info!("User {} logged in", user.username);
            return start_session(&state, &user, &next).await;
        }
    }

    warn!("Failed login for {:?}", username);
    let errors = ["Please enter a correct username and password."];
    let html = account_page(&state, &csrf, "Log in", |page| {
        account_form(page, url("login"), &login_fields(username), &next, &errors, "Log in")
    });
    Ok((StatusCode::UNAUTHORIZED, html).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, StatusCode> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state.db.delete_session(&hash_token(cookie.value())).await {
            Ok(()) | Err(DbError::NotFound(_)) => {}
            Err(e) => return Err(internal_error(e)),
        }
    }
    let jar = jar.remove(removal_cookie(SESSION_COOKIE));
    Ok((jar, Redirect::to(url("index"))).into_response())
}

fn require_user(user: Option<Extension<CurrentUser>>) -> Result<User, StatusCode> {
    user.map(|Extension(CurrentUser(u))| u).ok_or(StatusCode::UNAUTHORIZED)
}

pub async fn movie_preferences(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<MoviePreferencesOut>, StatusCode> {
    let user = require_user(user)?;
    let prefs = state.db.get_preferences(&user.id).await.map_err(internal_error)?;
    Ok(Json(MoviePreferencesOut::from(&prefs)))
}

fn toggle_error_page(state: &AppState, user: &User, csrf: &CsrfToken, message: &str) -> Html<String> {
    let page = Page {
        site_name: &state.config.site.name,
        title: "Movie lists",
        user: Some(user),
        csrf_token: &csrf.0,
    };
    let body = format!(
        r#"<h1>Movie lists</h1><p class="error">{}</p><p><a href="{}">Back to your movies</a></p>"#,
        escape(message),
        url("onboarding_movies")
    );
    page.render(&body)
}

/// Toggle one movie in one list. Scripts post JSON and get the lists back;
/// the page controls post a form and are redirected to `next`.
pub async fn toggle_movie_preference(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
    Path(movie_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let user = require_user(user)?;
    let from_form = is_form(&headers);
    let req: ToggleRequest = if from_form {
        serde_urlencoded::from_bytes(&body).map_err(|_| StatusCode::BAD_REQUEST)?
    } else {
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?
    };

    let refuse = |status: StatusCode, message: String| -> Response {
        if from_form {
            (status, toggle_error_page(&state, &user, &csrf, &message)).into_response()
        } else {
            (status, Json(ErrorMessage::new(message))).into_response()
        }
    };

    let Some(kind) = PreferenceKind::from_str(req.action.trim()) else {
        return Ok(refuse(StatusCode::BAD_REQUEST, format!("Unknown action {:?}", req.action)));
    };
    state.db.get_movie(movie_id).await.map_err(db_status)?;

    let mut prefs = state.db.get_preferences(&user.id).await.map_err(internal_error)?;
    if let Err(e) = recommend::toggle(&mut prefs, kind, movie_id) {
        return Ok(refuse(StatusCode::CONFLICT, e.to_string()));
    }
    state.db.replace_preferences(&user.id, &prefs).await.map_err(internal_error)?;

    if from_form {
        let next = safe_next(req.next.as_deref());
        return Ok(Redirect::to(next).into_response());
    }
    Ok(Json(MoviePreferencesOut::from(&prefs)).into_response())
}

/// A page of random movies, each with the six list toggles.
pub async fn onboarding_page(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
) -> Result<Response, StatusCode> {
    let Some(Extension(CurrentUser(user))) = user else {
        let target = format!("{}?next={}", url("login"), urlencoding::encode(url("onboarding_movies")));
        return Ok(Redirect::to(&target).into_response());
    };

    let movies = state
        .db
        .random_movies(state.config.random_movies.default_amount)
        .await
        .map_err(internal_error)?;
    let prefs = state.db.get_preferences(&user.id).await.map_err(internal_error)?;

    let page = Page {
        site_name: &state.config.site.name,
        title: "Rate movies",
        user: Some(&user),
        csrf_token: &csrf.0,
    };
    let mut body = String::from(
        "<h1>Rate movies</h1><p>Mark what you have seen, liked or want to watch. Recommendations use these lists.</p>",
    );
    body.push_str(r#"<div class="movie_container">"#);
    for movie in &movies {
        body.push_str(r#"<div class="onboarding_movie">"#);
        body.push_str(&movie_card(movie));
        body.push_str(&preference_controls(&page, movie.id, &prefs, url("onboarding_movies")));
        body.push_str("</div>");
    }
    body.push_str("</div>");

    Ok(page.render(&body).into_response())
}

/// Replace all six lists at once, as sent by the onboarding page.
pub async fn onboarding_movies(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(req): Json<MoviePreferencesIn>,
) -> Result<Response, StatusCode> {
    let user = require_user(user)?;
    let prefs = MoviePreferences::from(req);
    if let Err(e) = recommend::validate(&prefs) {
        return Ok((StatusCode::BAD_REQUEST, Json(ErrorMessage::new(e.to_string()))).into_response());
    }

    let ids: Vec<i64> = PreferenceKind::ALL
        .iter()
        .flat_map(|k| prefs.set(*k).iter().copied())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let found = state.db.get_movies_by_ids(&ids).await.map_err(internal_error)?;
    if found.len() != ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.iter().any(|m| m.id == **id))
            .map(|id| id.to_string())
            .collect();
        let msg = ErrorMessage::new(format!("Unknown movies: {}", missing.join(", ")));
        return Ok((StatusCode::BAD_REQUEST, Json(msg)).into_response());
    }

    state.db.replace_preferences(&user.id, &prefs).await.map_err(internal_error)?;
    info!("Saved onboarding preferences for {}", user.username);

    Ok(Json(json!({ "status": "ok" })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/movie/?id=1")), "/movie/?id=1");
        assert_eq!(safe_next(Some("//evil.example")), "/profile/");
        assert_eq!(safe_next(Some("https://evil.example")), "/profile/");
        assert_eq!(safe_next(None), "/profile/");
    }

    #[test]
    fn test_valid_username() {
        assert!(valid_username("alice.b+c@x"));
        assert!(!valid_username(""));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"a".repeat(151)));
    }
}
