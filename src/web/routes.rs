//! Named URL table. Pages link through `url()` so a path only lives here.

use axum::routing::{get, post, MethodRouter};

use super::{accounts, api, csrf, pages};
use crate::server::AppState;

/// `(name, path)` for every route the site serves.
pub const ROUTES: &[(&str, &str)] = &[
    ("index", "/"),
    ("get_csrf_token", "/get-csrf-token/"),
    ("about", "/about/"),
    ("profile", "/profile/"),
    ("contact", "/contact/"),
    ("search_movies", "/search/movies"),
    ("movie", "/movie/"),
    ("search_movies_json", "/api/search/movies"),
    ("random_movies", "/api/movies/"),
    ("create_recommendation", "/api/recommendations"),
    ("recommendation", "/api/recommendations/:id"),
    ("signup", "/accounts/signup/"),
    ("login", "/accounts/login/"),
    ("logout", "/accounts/logout/"),
    ("movie_preferences", "/accounts/preferences/movies"),
    ("toggle_movie_preference", "/accounts/preferences/movies/:movie_id"),
    ("onboarding_movies", "/accounts/onboarding/movies/"),
];

/// Path registered under `name`.
pub fn reverse(name: &str) -> Option<&'static str> {
    ROUTES.iter().find(|(n, _)| *n == name).map(|(_, p)| *p)
}

/// Like `reverse` for names known to exist.
pub fn url(name: &str) -> &'static str {
    reverse(name).unwrap_or("/")
}

/// Handler registered under `name`.
pub fn handler(name: &str) -> Option<MethodRouter<AppState>> {
    let route = match name {
        "index" => get(pages::index),
        "get_csrf_token" => get(csrf::get_csrf_token),
        "about" => get(pages::about),
        "profile" => get(pages::profile),
        "contact" => get(pages::contact).post(pages::contact_submit),
        "search_movies" => get(pages::search_movies),
        "movie" => get(pages::movie),
        "search_movies_json" => get(api::search_movies_query).post(api::search_movies_json),
        "random_movies" => get(api::random_movies),
        "create_recommendation" => post(api::create_recommendation),
        "recommendation" => get(api::get_recommendation),
        "signup" => get(accounts::signup_page).post(accounts::signup),
        "login" => get(accounts::login_page).post(accounts::login),
        "logout" => post(accounts::logout),
        "movie_preferences" => get(accounts::movie_preferences),
        "toggle_movie_preference" => post(accounts::toggle_movie_preference),
        "onboarding_movies" => get(accounts::onboarding_page).post(accounts::onboarding_movies),
        _ => return None,
    };
    Some(route)
}

/// The path with a trailing slash appended, if that names a route.
pub fn with_slash(path: &str) -> Option<String> {
    if path.ends_with('/') {
        return None;
    }
    let candidate = format!("{}/", path);
    ROUTES
        .iter()
        .any(|(_, p)| *p == candidate)
        .then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_has_a_handler() {
        for (name, _) in ROUTES {
            assert!(handler(name).is_some(), "no handler for {}", name);
        }
        assert!(handler("nope").is_none());
    }

    #[test]
    fn test_reverse() {
        assert_eq!(reverse("index"), Some("/"));
        assert_eq!(reverse("search_movies"), Some("/search/movies"));
        assert_eq!(reverse("search_movies_json"), Some("/api/search/movies"));
        assert_eq!(reverse("movie"), Some("/movie/"));
        assert_eq!(reverse("unknown"), None);
    }

    #[test]
    fn test_names_and_paths_are_unique() {
        for (i, (name, path)) in ROUTES.iter().enumerate() {
            for (other_name, other_path) in &ROUTES[i + 1..] {
                assert_ne!(name, other_name);
                assert_ne!(path, other_path);
            }
        }
    }

    #[test]
    fn test_with_slash() {
        assert_eq!(with_slash("/about").as_deref(), Some("/about/"));
        assert_eq!(with_slash("/about/"), None);
        assert_eq!(with_slash("/search/movies"), None);
        assert_eq!(with_slash("/nowhere"), None);
    }
}
