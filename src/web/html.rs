use std::fmt::Write;

use axum::response::Html;

use crate::db::{Movie, MoviePreferences, PreferenceKind, User};
use super::routes::url;

pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w300";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Common page data.
pub struct Page<'a> {
    pub site_name: &'a str,
    pub title: &'a str,
    pub user: Option<&'a User>,
    pub csrf_token: &'a str,
}

impl Page<'_> {
    pub fn render(&self, body: &str) -> Html<String> {
        let mut nav = format!(
            r#"<a href="{}">Home</a> <a href="{}">About</a> <a href="{}">Contact</a>"#,
            url("index"),
            url("about"),
            url("contact"),
        );
        match self.user {
            Some(user) => {
                let _ = write!(
                    nav,
                    r#" <a href="{}">{}</a> <form class="inline" method="post" action="{}">{}<button type="submit">Log out</button></form>"#,
                    url("profile"),
                    escape(&user.username),
                    url("logout"),
                    self.csrf_field(),
                );
            }
            None => {
                let _ = write!(
                    nav,
                    r#" <a href="{}">Log in</a> <a href="{}">Sign up</a>"#,
                    url("login"),
                    url("signup"),
                );
            }
        }

        Html(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | {site}</title>
</head>
<body>
<header><a class="brand" href="{home}">{site}</a>
<nav>{nav}</nav>
<form class="search" method="get" action="{search}"><input type="search" name="q" placeholder="Search movies"></form>
</header>
<main>
{body}
</main>
</body>
</html>
"#,
            title = escape(self.title),
            site = escape(self.site_name),
            home = url("index"),
            nav = nav,
            search = url("search_movies"),
            body = body,
        ))
    }

    /// Hidden input carrying the CSRF token for a POST form.
    pub fn csrf_field(&self) -> String {
        format!(
            r#"<input type="hidden" name="csrfmiddlewaretoken" value="{}">"#,
            escape(self.csrf_token)
        )
    }
}

pub fn poster_url(movie: &Movie) -> Option<String> {
    movie.poster.as_ref().map(|p| format!("{}{}", POSTER_BASE, p))
}

pub fn movie_link(movie: &Movie) -> String {
    format!("{}?id={}", url("movie"), movie.id)
}

pub fn movie_card(movie: &Movie) -> String {
    let mut card = format!(r#"<div class="movie"><a href="{}">"#, movie_link(movie));
    if let Some(poster) = poster_url(movie) {
        let _ = write!(
            card,
            r#"<img src="{}" alt="{}" loading="lazy">"#,
            escape(&poster),
            escape(&movie.title)
        );
    }
    let _ = write!(card, "<h3>{}</h3>", escape(&movie.title));
    if let Some(year) = movie.year {
        let _ = write!(card, "<p>{}</p>", year);
    }
    card.push_str("</a></div>");
    card
}

pub fn movie_grid(movies: &[Movie]) -> String {
    let mut grid = String::from(r#"<div class="movie_container">"#);
    for movie in movies {
        grid.push_str(&movie_card(movie));
    }
    grid.push_str("</div>");
    grid
}

fn preference_label(kind: PreferenceKind) -> &'static str {
    match kind {
        PreferenceKind::Liked => "Like",
        PreferenceKind::Disliked => "Dislike",
        PreferenceKind::Watched => "Seen it",
        PreferenceKind::Watchlist => "Watchlist",
        PreferenceKind::Rewatch => "Rewatch",
        PreferenceKind::Blocked => "Block",
    }
}

/// One small POST form per list, each toggling `movie_id` in that list and
/// coming back to `next`. Lists the movie is already on are marked active.
pub fn preference_controls(page: &Page, movie_id: i64, prefs: &MoviePreferences, next: &str) -> String {
    let action = format!("{}/{}", url("movie_preferences"), movie_id);
    let mut controls = String::from(r#"<div class="preferences">"#);
    for kind in PreferenceKind::ALL {
        let active = if prefs.set(kind).contains(&movie_id) { " active" } else { "" };
        let _ = write!(
            controls,
            r#"<form class="inline" method="post" action="{}">{}<input type="hidden" name="action" value="{}"><input type="hidden" name="next" value="{}"><button type="submit" class="toggle{}">{}</button></form>"#,
            action,
            page.csrf_field(),
            kind.as_str(),
            escape(next),
            active,
            preference_label(kind),
        );
    }
    controls.push_str("</div>");
    controls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Genre;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#x27;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_movie_card_escapes_title() {
        let movie = Movie {
            id: 42,
            title: "<script>".to_string(),
            year: Some(2001),
            poster: Some("/p.jpg".to_string()),
            overview: None,
            runtime: None,
            rating: None,
            popularity: None,
            genres: vec![Genre::Drama],
        };
        let card = movie_card(&movie);
        assert!(card.contains("/movie/?id=42"));
        assert!(card.contains("https://image.tmdb.org/t/p/w300/p.jpg"));
        assert!(card.contains("&lt;script&gt;"));
        assert!(!card.contains("<script>"));
    }

    #[test]
    fn test_preference_controls() {
        let page = Page {
            site_name: "site",
            title: "t",
            user: None,
            csrf_token: "tok",
        };
        let mut prefs = MoviePreferences::default();
        prefs.watched.insert(7);

        let html = preference_controls(&page, 7, &prefs, "/movie/?id=7");
        assert_eq!(html.matches("<form").count(), 6);
        assert_eq!(html.matches(r#"action="/accounts/preferences/movies/7""#).count(), 6);
        assert_eq!(html.matches(r#"value="tok""#).count(), 6);
        assert!(html.contains(r#"value="watched"><input type="hidden" name="next" value="/movie/?id=7"><button type="submit" class="toggle active">"#));
        assert_eq!(html.matches("toggle active").count(), 1);
    }
}
