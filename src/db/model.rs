use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::genre::Genre;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub overview: Option<String>,
    pub runtime: Option<i32>,
    pub rating: Option<f64>,
    pub popularity: Option<f64>,
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub user_id: Option<String>,
    /// `None` means any genre.
    pub genres: Option<Vec<Genre>>,
    pub runtime_min: Option<i32>,
    pub runtime_max: Option<i32>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created: Option<String>,
    pub lastlogin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Hex encoded sha256 of the cookie value.
    pub token_hash: String,
    pub user_id: String,
    pub created: Option<DateTime<Utc>>,
    pub lastused: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
    pub created: Option<DateTime<Utc>>,
}

/// Which list a movie preference row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKind {
    Liked,
    Disliked,
    Watched,
    Watchlist,
    Rewatch,
    Blocked,
}

impl PreferenceKind {
    pub const ALL: [PreferenceKind; 6] = [
        PreferenceKind::Liked,
        PreferenceKind::Disliked,
        PreferenceKind::Watched,
        PreferenceKind::Watchlist,
        PreferenceKind::Rewatch,
        PreferenceKind::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKind::Liked => "liked",
            PreferenceKind::Disliked => "disliked",
            PreferenceKind::Watched => "watched",
            PreferenceKind::Watchlist => "watchlist",
            PreferenceKind::Rewatch => "rewatch",
            PreferenceKind::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        PreferenceKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

/// A user's six movie lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoviePreferences {
    pub liked: BTreeSet<i64>,
    pub disliked: BTreeSet<i64>,
    pub watched: BTreeSet<i64>,
    pub watchlist: BTreeSet<i64>,
    pub rewatch: BTreeSet<i64>,
    pub blocked: BTreeSet<i64>,
}

impl MoviePreferences {
    pub fn set(&self, kind: PreferenceKind) -> &BTreeSet<i64> {
        match kind {
            PreferenceKind::Liked => &self.liked,
            PreferenceKind::Disliked => &self.disliked,
            PreferenceKind::Watched => &self.watched,
            PreferenceKind::Watchlist => &self.watchlist,
            PreferenceKind::Rewatch => &self.rewatch,
            PreferenceKind::Blocked => &self.blocked,
        }
    }

    pub fn set_mut(&mut self, kind: PreferenceKind) -> &mut BTreeSet<i64> {
        match kind {
            PreferenceKind::Liked => &mut self.liked,
            PreferenceKind::Disliked => &mut self.disliked,
            PreferenceKind::Watched => &mut self.watched,
            PreferenceKind::Watchlist => &mut self.watchlist,
            PreferenceKind::Rewatch => &mut self.rewatch,
            PreferenceKind::Blocked => &mut self.blocked,
        }
    }

    pub fn is_empty(&self) -> bool {
        PreferenceKind::ALL.iter().all(|k| self.set(*k).is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrate::MigrationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid genre: {0}")]
    InvalidGenre(String),
}

impl From<super::genre::UnknownGenre> for DbError {
    fn from(e: super::genre::UnknownGenre) -> Self {
        DbError::InvalidGenre(e.0)
    }
}

pub type DbResult<T> = Result<T, DbError>;
