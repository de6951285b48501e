use std::fmt::Write;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::csrf::CsrfToken;
use super::html::{escape, movie_grid, movie_link, poster_url, preference_controls, Page};
use super::routes::url;
use super::session::CurrentUser;
use super::{db_status, internal_error};
use crate::db::{ContactMessage, ContactRepo, MovieRepo, PreferenceKind, PreferenceRepo, RecommendationRepo, User};
use crate::server::AppState;

const SIMILAR_MOVIES: usize = 6;
const RECENT_RECOMMENDATIONS: u32 = 10;

fn page<'a>(state: &'a AppState, title: &'a str, user: Option<&'a User>, csrf: &'a CsrfToken) -> Page<'a> {
    Page {
        site_name: &state.config.site.name,
        title,
        user,
        csrf_token: &csrf.0,
    }
}

fn current(user: &Option<Extension<CurrentUser>>) -> Option<&User> {
    user.as_ref().map(|Extension(CurrentUser(u))| u)
}

pub async fn index(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
) -> Result<Html<String>, StatusCode> {
    let movies = state
        .db
        .random_movies(state.config.random_movies.default_amount)
        .await
        .map_err(internal_error)?;

    let mut body = format!("<h1>{}</h1>", escape(&state.config.site.name));
    match current(&user) {
        Some(u) => {
            let _ = write!(
                body,
                r#"<p>Welcome back, {}. Your lists live on your <a href="{}">profile</a>.</p>"#,
                escape(&u.username),
                url("profile")
            );
        }
        None => {
            let _ = write!(
                body,
                r#"<p><a href="{}">Sign up</a> to rate movies and get recommendations.</p>"#,
                url("signup")
            );
        }
    }
    let _ = write!(
        body,
        r#"<form method="get" action="{}"><input type="search" name="q" placeholder="Find a movie"><button type="submit">Search</button></form>"#,
        url("search_movies")
    );
    body.push_str(&movie_grid(&movies));

    Ok(page(&state, "Home", current(&user), &csrf).render(&body))
}

pub async fn about(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
) -> Result<Html<String>, StatusCode> {
    let count = state.db.count_movies().await.map_err(internal_error)?;
    let body = format!(
        "<h1>About</h1><p>{} suggests movies based on what you liked, disliked and have already seen.</p>\
         <p>The catalog currently holds {} movies. Movie data and posters come from TMDB.</p>",
        escape(&state.config.site.name),
        count
    );
    Ok(page(&state, "About", current(&user), &csrf).render(&body))
}

pub async fn profile(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
) -> Result<Response, StatusCode> {
    let Some(user) = current(&user) else {
        let target = format!("{}?next={}", url("login"), urlencoding::encode(url("profile")));
        return Ok(Redirect::to(&target).into_response());
    };

    let prefs = state.db.get_preferences(&user.id).await.map_err(internal_error)?;
    let recommendations = state
        .db
        .list_recommendations_by_user(&user.id, RECENT_RECOMMENDATIONS)
        .await
        .map_err(internal_error)?;

    let mut body = format!("<h1>{}</h1><h2>Your lists</h2><ul>", escape(&user.username));
    for kind in PreferenceKind::ALL {
        let _ = write!(body, "<li>{}: {}</li>", kind.as_str(), prefs.set(kind).len());
    }
    body.push_str("</ul><h2>Recent recommendations</h2>");
    if recommendations.is_empty() {
        body.push_str("<p>None yet.</p>");
    } else {
        body.push_str("<ul>");
        for rec in &recommendations {
            let genres = match rec.genres {
                Some(ref genres) => genres.iter().map(|g| g.label()).collect::<Vec<_>>().join(", "),
                None => "any genre".to_string(),
            };
            let created = rec.created.map(|c| c.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_default();
            let _ = write!(body, "<li>{} ({})</li>", escape(&genres), created);
        }
        body.push_str("</ul>");
    }

    Ok(page(&state, "Profile", Some(user), &csrf).render(&body).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    fn errors(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Please enter your name.");
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            errors.push("Please enter a valid email address.");
        }
        if self.message.trim().is_empty() {
            errors.push("Please enter a message.");
        }
        errors
    }
}

fn contact_body(state: &AppState, page: &Page, form: &ContactForm, errors: &[&str]) -> String {
    let mut body = String::from("<h1>Contact</h1>");
    if let Some(ref email) = state.config.site.contact_email {
        let _ = write!(body, r#"<p>Or mail us at <a href="mailto:{0}">{0}</a>.</p>"#, escape(email));
    }
    if !errors.is_empty() {
        body.push_str(r#"<ul class="errors">"#);
        for e in errors {
            let _ = write!(body, "<li>{}</li>", e);
        }
        body.push_str("</ul>");
    }
    let _ = write!(
        body,
        r#"<form method="post" action="{action}">{csrf}
<label>Name <input name="name" value="{name}"></label>
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Message <textarea name="message">{message}</textarea></label>
<button type="submit">Send</button></form>"#,
        action = url("contact"),
        csrf = page.csrf_field(),
        name = escape(&form.name),
        email = escape(&form.email),
        message = escape(&form.message),
    );
    body
}

pub async fn contact(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
) -> Html<String> {
    let page = page(&state, "Contact", current(&user), &csrf);
    let body = contact_body(&state, &page, &ContactForm::default(), &[]);
    page.render(&body)
}

pub async fn contact_submit(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
    Form(form): Form<ContactForm>,
) -> Result<Response, StatusCode> {
    let page = page(&state, "Contact", current(&user), &csrf);

    let errors = form.errors();
    if !errors.is_empty() {
        let body = contact_body(&state, &page, &form, &errors);
        return Ok((StatusCode::BAD_REQUEST, page.render(&body)).into_response());
    }

    let msg = ContactMessage {
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        message: form.message.trim().to_string(),
        created: Some(Utc::now()),
    };
    state.db.add_contact_message(&msg).await.map_err(internal_error)?;
    info!("Contact message from {}", msg.email);

    let body = format!(
        r#"<h1>Thank you</h1><p>Thanks {}, we will get back to you.</p><p><a href="{}">Back home</a></p>"#,
        escape(&msg.name),
        url("index")
    );
    Ok(page.render(&body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SearchPageQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_movies(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
    Query(params): Query<SearchPageQuery>,
) -> Result<Html<String>, StatusCode> {
    let query = params.q.trim();
    let mut body = format!(
        r#"<h1>Search</h1><form method="get" action="{}"><input type="search" name="q" value="{}"><button type="submit">Search</button></form>"#,
        url("search_movies"),
        escape(query)
    );

    if !query.is_empty() {
        let movies = state
            .catalog
            .search(query, state.config.search.max_results)
            .await
            .map_err(internal_error)?;
        if movies.is_empty() {
            let _ = write!(body, "<p>No movies found for <em>{}</em>.</p>", escape(query));
        } else {
            let _ = write!(body, "<p>{} results for <em>{}</em></p>", movies.len(), escape(query));
            body.push_str(&movie_grid(&movies));
        }
    }

    Ok(page(&state, "Search", current(&user), &csrf).render(&body))
}

#[derive(Debug, Deserialize)]
pub struct MovieQuery {
    pub id: Option<String>,
}

pub async fn movie(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Extension(csrf): Extension<CsrfToken>,
    Query(params): Query<MovieQuery>,
) -> Result<Html<String>, StatusCode> {
    let id: i64 = params
        .id
        .as_deref()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(StatusCode::NOT_FOUND)?;
    let movie = state.db.get_movie(id).await.map_err(db_status)?;
    let similar = state.catalog.similar(id, SIMILAR_MOVIES).await.map_err(internal_error)?;

    let mut body = String::from(r#"<article class="movie_detail">"#);
    if let Some(poster) = poster_url(&movie) {
        let _ = write!(body, r#"<img src="{}" alt="{}">"#, escape(&poster), escape(&movie.title));
    }
    let _ = write!(body, "<h1>{}", escape(&movie.title));
    if let Some(year) = movie.year {
        let _ = write!(body, " ({})", year);
    }
    body.push_str("</h1><dl>");
    if !movie.genres.is_empty() {
        let genres: Vec<_> = movie.genres.iter().map(|g| g.label()).collect();
        let _ = write!(body, "<dt>Genres</dt><dd>{}</dd>", genres.join(", "));
    }
    if let Some(runtime) = movie.runtime {
        let _ = write!(body, "<dt>Runtime</dt><dd>{} min</dd>", runtime);
    }
    if let Some(rating) = movie.rating {
        let _ = write!(body, "<dt>Rating</dt><dd>{:.1}</dd>", rating);
    }
    body.push_str("</dl>");
    if let Some(ref overview) = movie.overview {
        let _ = write!(body, "<p>{}</p>", escape(overview));
    }
    body.push_str("</article>");

    let page = page(&state, &movie.title, current(&user), &csrf);
    if let Some(u) = current(&user) {
        let prefs = state.db.get_preferences(&u.id).await.map_err(internal_error)?;
        body.push_str(&preference_controls(&page, movie.id, &prefs, &movie_link(&movie)));
    }
    if !similar.is_empty() {
        body.push_str("<h2>Similar movies</h2>");
        body.push_str(&movie_grid(&similar));
    }

    Ok(page.render(&body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_form_errors() {
        let form = ContactForm {
            name: " ".to_string(),
            email: "nobody".to_string(),
            message: String::new(),
        };
        assert_eq!(form.errors().len(), 3);

        let form = ContactForm {
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            message: "Hi".to_string(),
        };
        assert!(form.errors().is_empty());
    }
}
