use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Deserialize;

use crate::db::{Genre, Movie, MoviePreferences};

/// Weight of one unit of genre affinity relative to one rating point.
const AFFINITY_WEIGHT: f64 = 0.5;
const WATCHLIST_BONUS: f64 = 1.0;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
    #[serde(default)]
    pub runtime_min: Option<i32>,
    #[serde(default)]
    pub runtime_max: Option<i32>,
}

impl RecommendationRequest {
    fn matches(&self, movie: &Movie) -> bool {
        if let Some(ref genres) = self.genres {
            if !genres.is_empty() && !movie.genres.iter().any(|g| genres.contains(g)) {
                return false;
            }
        }
        if self.runtime_min.is_some() || self.runtime_max.is_some() {
            let Some(runtime) = movie.runtime else {
                return false;
            };
            if self.runtime_min.is_some_and(|min| runtime < min) {
                return false;
            }
            if self.runtime_max.is_some_and(|max| runtime > max) {
                return false;
            }
        }
        true
    }
}

/// Movies that may be recommended: matching the request, not blocked, and
/// either unseen or on the rewatch list.
pub fn possible_films<'a>(
    movies: &'a [Movie],
    request: &RecommendationRequest,
    prefs: &MoviePreferences,
) -> Vec<&'a Movie> {
    movies
        .iter()
        .filter(|m| request.matches(m))
        .filter(|m| !prefs.blocked.contains(&m.id))
        .filter(|m| !prefs.watched.contains(&m.id) || prefs.rewatch.contains(&m.id))
        .collect()
}

/// Per genre: liked movies in that genre minus disliked ones.
pub fn genre_affinity(movies: &[Movie], prefs: &MoviePreferences) -> HashMap<Genre, i32> {
    let mut affinity = HashMap::new();
    for movie in movies {
        let delta = if prefs.liked.contains(&movie.id) {
            1
        } else if prefs.disliked.contains(&movie.id) {
            -1
        } else {
            continue;
        };
        for genre in &movie.genres {
            *affinity.entry(*genre).or_insert(0) += delta;
        }
    }
    affinity
}

pub fn score(movie: &Movie, affinity: &HashMap<Genre, i32>, prefs: &MoviePreferences) -> f64 {
    let genre_score: i32 = movie
        .genres
        .iter()
        .map(|g| affinity.get(g).copied().unwrap_or(0))
        .sum();
    let mut score = movie.rating.unwrap_or(0.0) + AFFINITY_WEIGHT * f64::from(genre_score);
    if prefs.watchlist.contains(&movie.id) {
        score += WATCHLIST_BONUS;
    }
    score
}

/// The `count` best candidates. Ties go to the more popular movie, then
/// the lower id.
pub fn recommended_films(
    candidates: &[&Movie],
    affinity: &HashMap<Genre, i32>,
    prefs: &MoviePreferences,
    count: usize,
) -> Vec<i64> {
    let mut scored: Vec<(f64, &Movie)> = candidates
        .iter()
        .map(|m| (score(m, affinity, prefs), *m))
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.popularity
                    .unwrap_or(0.0)
                    .partial_cmp(&a.popularity.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    scored.into_iter().take(count).map(|(_, m)| m.id).collect()
}
