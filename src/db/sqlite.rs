use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{error, info};

use super::genre::{decode_genres, encode_genres};
use super::migrate;
use super::model::*;
use super::repo::*;

pub struct SqliteRepository {
    pool: SqlitePool,
}

type MovieRow = (
    i64,
    String,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<f64>,
    Option<f64>,
    String,
);

const MOVIE_COLUMNS: &str = "id, title, year, poster, overview, runtime, rating, popularity, genres";

fn movie_from_row(r: MovieRow) -> DbResult<Movie> {
    Ok(Movie {
        id: r.0,
        title: r.1,
        year: r.2,
        poster: r.3,
        overview: r.4,
        runtime: r.5,
        rating: r.6,
        popularity: r.7,
        genres: decode_genres(&r.8)?,
    })
}

type RecommendationRow = (
    String,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<i32>,
    Option<String>,
);

fn recommendation_from_row(r: RecommendationRow) -> DbResult<Recommendation> {
    let genres = match r.2 {
        Some(ref raw) => Some(decode_genres(raw)?),
        None => None,
    };
    Ok(Recommendation {
        id: r.0,
        user_id: r.1,
        genres,
        runtime_min: r.3,
        runtime_max: r.4,
        created: parse_time(r.5),
    })
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> DbError {
    move |e| match e {
        sqlx::Error::RowNotFound => DbError::NotFound(what),
        _ => DbError::Sqlx(e),
    }
}

/// Map write errors raised by constraints and the genre triggers.
fn write_error(e: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(ref db) = e {
        if db.message().contains("invalid genre") {
            return DbError::InvalidGenre(db.message().to_string());
        }
        if db.is_unique_violation() {
            return DbError::AlreadyExists(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return DbError::NotFound(db.message().to_string());
        }
    }
    DbError::Sqlx(e)
}

impl SqliteRepository {
    pub async fn new(db_path: &str) -> DbResult<Self> {
        let in_memory = db_path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(db_path)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let repo = Self { pool };

        info!("Database opened at {}", db_path);

        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Purge sessions idle for longer than `max_idle`, once an hour.
    pub fn start_background_tasks(self: Arc<Self>, max_idle: chrono::Duration) {
        let repo_clone = Arc::clone(&self);
        tokio::spawn(async move {
            repo_clone.session_purge_loop(max_idle).await;
        });
    }

    async fn session_purge_loop(&self, max_idle: chrono::Duration) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match self.delete_idle_sessions(Utc::now() - max_idle).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} idle sessions", n),
                Err(e) => error!("Failed to purge idle sessions: {}", e),
            }
        }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> DbResult<Vec<&'static str>> {
        let applied = migrate::run(&self.pool).await?;
        for id in &applied {
            info!("Applied migration {}", id);
        }
        Ok(applied)
    }

    pub async fn migration_status(&self) -> DbResult<Vec<migrate::MigrationStatus>> {
        Ok(migrate::status(&self.pool).await?)
    }

    async fn relation_movies(&self, table: &str, rec_id: &str) -> DbResult<Vec<i64>> {
        let sql = format!(
            "SELECT movie_id FROM {} WHERE recommendation_id = ? ORDER BY movie_id",
            table
        );
        let results = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(rec_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(results.into_iter().map(|r| r.0).collect())
    }

    async fn relation_recommendations(&self, table: &str, movie_id: i64) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT recommendation_id FROM {} WHERE movie_id = ? ORDER BY recommendation_id",
            table
        );
        let results = sqlx::query_as::<_, (String,)>(&sql)
            .bind(movie_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(results.into_iter().map(|r| r.0).collect())
    }
}

const POSSIBLE_FILMS: &str = "recommendation_possible_films";
const RECOMMENDED_FILMS: &str = "recommendation_recommended_films";

#[async_trait]
impl MovieRepo for SqliteRepository {
    async fn get_movie(&self, id: i64) -> DbResult<Movie> {
        let sql = format!("SELECT {} FROM movies WHERE id = ?", MOVIE_COLUMNS);
        let row = sqlx::query_as::<_, MovieRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Movie not found: {}", id)))?;
        movie_from_row(row)
    }

    async fn upsert_movie(&self, movie: &Movie) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO movies
            (id, title, year, poster, overview, runtime, rating, popularity, genres)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                year = excluded.year,
                poster = excluded.poster,
                overview = excluded.overview,
                runtime = excluded.runtime,
                rating = excluded.rating,
                popularity = excluded.popularity,
                genres = excluded.genres",
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.poster)
        .bind(&movie.overview)
        .bind(movie.runtime)
        .bind(movie.rating)
        .bind(movie.popularity)
        .bind(encode_genres(&movie.genres))
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn delete_movie(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_movies(&self) -> DbResult<Vec<Movie>> {
        let sql = format!("SELECT {} FROM movies ORDER BY id", MOVIE_COLUMNS);
        let rows = sqlx::query_as::<_, MovieRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(movie_from_row).collect()
    }

    async fn get_movies_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM movies WHERE id IN ({})",
            MOVIE_COLUMNS, placeholders
        );
        let mut query = sqlx::query_as::<_, MovieRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id: HashMap<i64, Movie> = HashMap::new();
        for row in rows {
            let movie = movie_from_row(row)?;
            by_id.insert(movie.id, movie);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn random_movies(&self, amount: u32) -> DbResult<Vec<Movie>> {
        let sql = format!("SELECT {} FROM movies ORDER BY RANDOM() LIMIT ?", MOVIE_COLUMNS);
        let rows = sqlx::query_as::<_, MovieRow>(&sql)
            .bind(amount)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(movie_from_row).collect()
    }

    async fn count_movies(&self) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecommendationRepo for SqliteRepository {
    async fn get_recommendation(&self, id: &str) -> DbResult<Recommendation> {
        let row = sqlx::query_as::<_, RecommendationRow>(
            "SELECT id, user_id, genres, runtime_min, runtime_max, created FROM recommendations WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Recommendation not found: {}", id)))?;
        recommendation_from_row(row)
    }

    async fn create_recommendation(
        &self,
        rec: &Recommendation,
        possible_films: &[i64],
        recommended_films: &[i64],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO recommendations (id, user_id, genres, runtime_min, runtime_max, created)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&rec.id)
        .bind(&rec.user_id)
        .bind(rec.genres.as_deref().map(encode_genres))
        .bind(rec.runtime_min)
        .bind(rec.runtime_max)
        .bind(rec.created.as_ref().map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        for (table, movie_ids) in [(POSSIBLE_FILMS, possible_films), (RECOMMENDED_FILMS, recommended_films)] {
            let sql = format!(
                "INSERT OR IGNORE INTO {} (recommendation_id, movie_id) VALUES (?, ?)",
                table
            );
            for movie_id in movie_ids {
                sqlx::query(&sql)
                    .bind(&rec.id)
                    .bind(*movie_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_recommendations_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            "SELECT id, user_id, genres, runtime_min, runtime_max, created FROM recommendations
             WHERE user_id = ? ORDER BY created DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(recommendation_from_row).collect()
    }

    async fn get_possible_films(&self, rec_id: &str) -> DbResult<Vec<i64>> {
        self.relation_movies(POSSIBLE_FILMS, rec_id).await
    }

    async fn get_recommended_films(&self, rec_id: &str) -> DbResult<Vec<i64>> {
        self.relation_movies(RECOMMENDED_FILMS, rec_id).await
    }

    async fn get_possible_recommendations(&self, movie_id: i64) -> DbResult<Vec<String>> {
        self.relation_recommendations(POSSIBLE_FILMS, movie_id).await
    }

    async fn get_recommendations_for_movie(&self, movie_id: i64) -> DbResult<Vec<String>> {
        self.relation_recommendations(RECOMMENDED_FILMS, movie_id).await
    }
}

#[async_trait]
impl UserRepo for SqliteRepository {
    async fn get_user(&self, username: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>("SELECT id, username, password, created, lastlogin FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User not found: {}", username)))
    }

    async fn get_user_by_id(&self, id: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>("SELECT id, username, password, created, lastlogin FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User not found: {}", id)))
    }

    async fn create_user(&self, user: &User) -> DbResult<()> {
        sqlx::query("INSERT INTO users (id, username, password, created, lastlogin) VALUES (?, ?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.password)
            .bind(&user.created)
            .bind(&user.lastlogin)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn touch_login(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE users SET lastlogin = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepo for SqliteRepository {
    async fn get_session(&self, token_hash: &str) -> DbResult<Session> {
        let result = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT token_hash, user_id, created, lastused FROM sessions WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Session not found".to_string()))?;

        sqlx::query("UPDATE sessions SET lastused = ? WHERE token_hash = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(Session {
            token_hash: result.0,
            user_id: result.1,
            created: parse_time(result.2),
            lastused: parse_time(result.3),
        })
    }

    async fn create_session(&self, session: &Session) -> DbResult<()> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, created, lastused) VALUES (?, ?, ?, ?)")
            .bind(&session.token_hash)
            .bind(&session.user_id)
            .bind(session.created.as_ref().map(|dt| dt.to_rfc3339()))
            .bind(session.lastused.as_ref().map(|dt| dt.to_rfc3339()))
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn delete_session(&self, token_hash: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_idle_sessions(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        // Timestamps are RFC 3339 in UTC, so they compare as text.
        let result = sqlx::query("DELETE FROM sessions WHERE COALESCE(lastused, created, '') < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PreferenceRepo for SqliteRepository {
    async fn get_preferences(&self, user_id: &str) -> DbResult<MoviePreferences> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT movie_id, kind FROM movie_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut prefs = MoviePreferences::default();
        for (movie_id, kind) in rows {
            if let Some(kind) = PreferenceKind::from_str(&kind) {
                prefs.set_mut(kind).insert(movie_id);
            }
        }
        Ok(prefs)
    }

    async fn replace_preferences(&self, user_id: &str, prefs: &MoviePreferences) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM movie_preferences WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for kind in PreferenceKind::ALL {
            for movie_id in prefs.set(kind) {
                sqlx::query("INSERT INTO movie_preferences (user_id, movie_id, kind) VALUES (?, ?, ?)")
                    .bind(user_id)
                    .bind(*movie_id)
                    .bind(kind.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ContactRepo for SqliteRepository {
    async fn add_contact_message(&self, msg: &ContactMessage) -> DbResult<()> {
        sqlx::query("INSERT INTO contact_messages (name, email, message, created) VALUES (?, ?, ?, ?)")
            .bind(&msg.name)
            .bind(&msg.email)
            .bind(&msg.message)
            .bind(msg.created.as_ref().map(|dt| dt.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
