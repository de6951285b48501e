use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::*;

#[async_trait]
pub trait MovieRepo: Send + Sync {
    async fn get_movie(&self, id: i64) -> DbResult<Movie>;
    async fn upsert_movie(&self, movie: &Movie) -> DbResult<()>;
    async fn delete_movie(&self, id: i64) -> DbResult<()>;
    async fn list_movies(&self) -> DbResult<Vec<Movie>>;
    /// Returns the movies that exist, in the order of `ids`.
    async fn get_movies_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Movie>>;
    async fn random_movies(&self, amount: u32) -> DbResult<Vec<Movie>>;
    async fn count_movies(&self) -> DbResult<i64>;
}

#[async_trait]
pub trait RecommendationRepo: Send + Sync {
    async fn get_recommendation(&self, id: &str) -> DbResult<Recommendation>;
    /// Stores the recommendation and both film sets in one transaction.
    /// Repeated ids are stored once.
    async fn create_recommendation(
        &self,
        rec: &Recommendation,
        possible_films: &[i64],
        recommended_films: &[i64],
    ) -> DbResult<()>;
    async fn list_recommendations_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<Recommendation>>;
    async fn get_possible_films(&self, rec_id: &str) -> DbResult<Vec<i64>>;
    async fn get_recommended_films(&self, rec_id: &str) -> DbResult<Vec<i64>>;
    /// Reverse side of `possible_films`.
    async fn get_possible_recommendations(&self, movie_id: i64) -> DbResult<Vec<String>>;
    /// Reverse side of `recommended_films`.
    async fn get_recommendations_for_movie(&self, movie_id: i64) -> DbResult<Vec<String>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, username: &str) -> DbResult<User>;
    async fn get_user_by_id(&self, id: &str) -> DbResult<User>;
    async fn create_user(&self, user: &User) -> DbResult<()>;
    async fn touch_login(&self, id: &str) -> DbResult<()>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn get_session(&self, token_hash: &str) -> DbResult<Session>;
    async fn create_session(&self, session: &Session) -> DbResult<()>;
    async fn delete_session(&self, token_hash: &str) -> DbResult<()>;
    /// Deletes sessions last used before `cutoff`. Returns how many went.
    async fn delete_idle_sessions(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;
}

#[async_trait]
pub trait PreferenceRepo: Send + Sync {
    async fn get_preferences(&self, user_id: &str) -> DbResult<MoviePreferences>;
    /// Replaces all six lists in one transaction.
    async fn replace_preferences(&self, user_id: &str, prefs: &MoviePreferences) -> DbResult<()>;
}

#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn add_contact_message(&self, msg: &ContactMessage) -> DbResult<()>;
}
