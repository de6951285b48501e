use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use chrono::{DateTime, Utc};

use crate::db::{Movie, MoviePreferences};
use crate::recommend::RecommendationDetail;

/// Movie as the site's scripts consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDto {
    pub id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub overview: Option<String>,
    pub runtime: Option<i32>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
}

impl From<&Movie> for MovieDto {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            name: movie.title.clone(),
            year: movie.year,
            poster: movie.poster.clone(),
            overview: movie.overview.clone(),
            runtime: movie.runtime,
            rating: movie.rating,
            genres: movie.genres.iter().map(|g| g.label().to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovieList {
    pub movies: Vec<MovieDto>,
}

impl MovieList {
    pub fn new(movies: &[Movie]) -> Self {
        Self {
            movies: movies.iter().map(MovieDto::from).collect(),
        }
    }
}

/// A recommendation with its films in the same shape as search results.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationDto {
    pub id: String,
    pub user_id: Option<String>,
    /// Genre labels; absent means any genre.
    pub genres: Option<Vec<String>>,
    pub runtime_min: Option<i32>,
    pub runtime_max: Option<i32>,
    pub created: Option<DateTime<Utc>>,
    pub possible_films: Vec<MovieDto>,
    pub recommended_films: Vec<MovieDto>,
}

impl From<&RecommendationDetail> for RecommendationDto {
    fn from(detail: &RecommendationDetail) -> Self {
        let rec = &detail.recommendation;
        Self {
            id: rec.id.clone(),
            user_id: rec.user_id.clone(),
            genres: rec
                .genres
                .as_ref()
                .map(|g| g.iter().map(|g| g.label().to_string()).collect()),
            runtime_min: rec.runtime_min,
            runtime_max: rec.runtime_max,
            created: rec.created,
            possible_films: detail.possible_films.iter().map(MovieDto::from).collect(),
            recommended_films: detail.recommended_films.iter().map(MovieDto::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub send_all: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

impl ErrorMessage {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Movie ids arrive as JSON numbers or as strings.
fn movie_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MovieId {
        Num(i64),
        Str(String),
    }

    let raw = Vec::<MovieId>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|id| match id {
            MovieId::Num(n) => Ok(n),
            MovieId::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid movie id {:?}", s))),
        })
        .collect()
}

fn as_strings(ids: &BTreeSet<i64>) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// The six lists as posted by the onboarding page and returned to it.
#[derive(Debug, Default, Deserialize)]
pub struct MoviePreferencesIn {
    #[serde(default, deserialize_with = "movie_ids")]
    pub movies_liked: BTreeSet<i64>,
    #[serde(default, deserialize_with = "movie_ids")]
    pub movies_disliked: BTreeSet<i64>,
    #[serde(default, deserialize_with = "movie_ids")]
    pub movies_watched: BTreeSet<i64>,
    #[serde(default, deserialize_with = "movie_ids")]
    pub watchlist: BTreeSet<i64>,
    #[serde(default, deserialize_with = "movie_ids")]
    pub movies_rewatch: BTreeSet<i64>,
    #[serde(default, deserialize_with = "movie_ids")]
    pub movies_blocked: BTreeSet<i64>,
}

impl From<MoviePreferencesIn> for MoviePreferences {
    fn from(p: MoviePreferencesIn) -> Self {
        Self {
            liked: p.movies_liked,
            disliked: p.movies_disliked,
            watched: p.movies_watched,
            watchlist: p.watchlist,
            rewatch: p.movies_rewatch,
            blocked: p.movies_blocked,
        }
    }
}

/// Ids go out as strings: the page keys its sets by DOM id.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MoviePreferencesOut {
    pub movies_liked: Vec<String>,
    pub movies_disliked: Vec<String>,
    pub movies_watched: Vec<String>,
    pub watchlist: Vec<String>,
    pub movies_rewatch: Vec<String>,
    pub movies_blocked: Vec<String>,
}

impl From<&MoviePreferences> for MoviePreferencesOut {
    fn from(p: &MoviePreferences) -> Self {
        Self {
            movies_liked: as_strings(&p.liked),
            movies_disliked: as_strings(&p.disliked),
            movies_watched: as_strings(&p.watched),
            watchlist: as_strings(&p.watchlist),
            movies_rewatch: as_strings(&p.rewatch),
            movies_blocked: as_strings(&p.blocked),
        }
    }
}

/// `{"action": "liked"}` from scripts, or the same fields from a page form
/// plus where to go afterwards.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub action: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_accept_string_and_number_ids() {
        let json = r#"{"movies_liked": ["603", 550], "movies_watched": ["603", "550"], "watchlist": []}"#;
        let prefs: MoviePreferences = serde_json::from_str::<MoviePreferencesIn>(json).unwrap().into();
        assert_eq!(prefs.liked.iter().copied().collect::<Vec<_>>(), vec![550, 603]);
        assert!(prefs.blocked.is_empty());

        let out = MoviePreferencesOut::from(&prefs);
        assert_eq!(out.movies_liked, vec!["550", "603"]);
    }

    #[test]
    fn test_recommendation_uses_movie_dtos_and_labels() {
        use crate::db::{Genre, Recommendation};

        let detail = RecommendationDetail {
            recommendation: Recommendation {
                id: "r1".to_string(),
                user_id: None,
                genres: Some(vec![Genre::ScienceFiction]),
                runtime_min: Some(90),
                runtime_max: None,
                created: None,
            },
            possible_films: Vec::new(),
            recommended_films: vec![Movie {
                id: 603,
                title: "The Matrix".to_string(),
                year: Some(1999),
                poster: None,
                overview: None,
                runtime: Some(136),
                rating: Some(8.7),
                popularity: Some(80.0),
                genres: vec![Genre::ScienceFiction],
            }],
        };
        let json = serde_json::to_value(RecommendationDto::from(&detail)).unwrap();
        assert_eq!(json["genres"][0], "Science Fiction");
        assert_eq!(json["recommended_films"][0]["name"], "The Matrix");
        assert_eq!(json["recommended_films"][0]["genres"][0], "Science Fiction");
        assert!(json["recommended_films"][0].get("popularity").is_none());
    }

    #[test]
    fn test_preferences_reject_garbage_ids() {
        let json = r#"{"movies_liked": ["abc"]}"#;
        assert!(serde_json::from_str::<MoviePreferencesIn>(json).is_err());
    }
}
