pub mod engine;
pub mod preferences;

use chrono::Utc;
use tracing::info;

use crate::db::{
    DbResult, Movie, MoviePreferences, MovieRepo, PreferenceRepo, Recommendation, RecommendationRepo,
};
pub use engine::RecommendationRequest;
pub use preferences::{toggle, validate, PreferenceError};

/// A stored recommendation with both film relations resolved.
#[derive(Debug, Clone)]
pub struct RecommendationDetail {
    pub recommendation: Recommendation,
    pub possible_films: Vec<Movie>,
    pub recommended_films: Vec<Movie>,
}

/// Build, store and return a recommendation for `user_id` (or an
/// anonymous visitor).
pub async fn create_recommendation<R>(
    repo: &R,
    user_id: Option<&str>,
    request: &RecommendationRequest,
    count: usize,
) -> DbResult<RecommendationDetail>
where
    R: MovieRepo + PreferenceRepo + RecommendationRepo + ?Sized,
{
    let prefs = match user_id {
        Some(id) => repo.get_preferences(id).await?,
        None => MoviePreferences::default(),
    };
    let movies = repo.list_movies().await?;

    let candidates = engine::possible_films(&movies, request, &prefs);
    let affinity = engine::genre_affinity(&movies, &prefs);
    let picked = engine::recommended_films(&candidates, &affinity, &prefs, count);

    let recommendation = Recommendation {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.map(|s| s.to_string()),
        genres: request.genres.clone().filter(|g| !g.is_empty()),
        runtime_min: request.runtime_min,
        runtime_max: request.runtime_max,
        created: Some(Utc::now()),
    };
    let possible: Vec<i64> = candidates.iter().map(|m| m.id).collect();
    repo.create_recommendation(&recommendation, &possible, &picked)
        .await?;

    info!(
        "Created recommendation {} with {} candidates, {} picked",
        recommendation.id,
        candidates.len(),
        picked.len()
    );

    Ok(RecommendationDetail {
        recommendation,
        possible_films: candidates.into_iter().cloned().collect(),
        recommended_films: repo.get_movies_by_ids(&picked).await?,
    })
}

pub async fn get_recommendation<R>(repo: &R, id: &str) -> DbResult<RecommendationDetail>
where
    R: MovieRepo + RecommendationRepo + ?Sized,
{
    let recommendation = repo.get_recommendation(id).await?;
    let possible = repo.get_possible_films(id).await?;
    let recommended = repo.get_recommended_films(id).await?;

    Ok(RecommendationDetail {
        recommendation,
        possible_films: repo.get_movies_by_ids(&possible).await?,
        recommended_films: repo.get_movies_by_ids(&recommended).await?,
    })
}
