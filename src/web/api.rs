use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::debug;

use super::session::CurrentUser;
use super::types::*;
use super::{db_status, internal_error};
use crate::db::MovieRepo;
use crate::recommend::{self, RecommendationRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub send_all: Option<String>,
}

fn truthy(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

async fn run_search(state: &AppState, req: SearchRequest) -> Result<Json<MovieList>, StatusCode> {
    let query = req.search.trim();
    if query.is_empty() {
        return Ok(Json(MovieList { movies: Vec::new() }));
    }
    let limit = if req.send_all {
        state.config.search.max_results
    } else {
        state.config.search.default_limit
    };

    let movies = state.catalog.search(query, limit).await.map_err(internal_error)?;
    debug!("Search {:?} found {} movies", query, movies.len());
    Ok(Json(MovieList::new(&movies)))
}

/// POST body `{"search": "...", "send_all": bool}`.
pub async fn search_movies_json(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<MovieList>, StatusCode> {
    run_search(&state, req).await
}

/// Same search, from `?search=&send_all=`.
pub async fn search_movies_query(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<MovieList>, StatusCode> {
    let req = SearchRequest {
        search: params.search,
        send_all: params.send_all.as_deref().map(truthy).unwrap_or(false),
    };
    run_search(&state, req).await
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    pub amount: Option<u32>,
}

pub async fn random_movies(
    State(state): State<AppState>,
    Query(params): Query<RandomQuery>,
) -> Result<Json<MovieList>, StatusCode> {
    let cfg = &state.config.random_movies;
    let amount = params.amount.unwrap_or(cfg.default_amount).min(cfg.max_amount);
    let movies = state.db.random_movies(amount).await.map_err(internal_error)?;
    Ok(Json(MovieList::new(&movies)))
}

pub async fn create_recommendation(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(req): Json<RecommendationRequest>,
) -> Result<(StatusCode, Json<RecommendationDto>), StatusCode> {
    if let (Some(min), Some(max)) = (req.runtime_min, req.runtime_max) {
        if min > max {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    let user_id = user.as_ref().map(|Extension(CurrentUser(u))| u.id.as_str());
    let detail = recommend::create_recommendation(
        state.db.as_ref(),
        user_id,
        &req,
        state.config.recommendations.count,
    )
    .await
    .map_err(db_status)?;
    Ok((StatusCode::CREATED, Json(RecommendationDto::from(&detail))))
}

pub async fn get_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecommendationDto>, StatusCode> {
    let detail = recommend::get_recommendation(state.db.as_ref(), &id)
        .await
        .map_err(db_status)?;
    Ok(Json(RecommendationDto::from(&detail)))
}
