use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::db::{DbError, Genre, Movie, MovieRepo};

/// One record of a TMDB style movie dump.
#[derive(Debug, Clone, Deserialize)]
pub struct MovieRecord {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub runtime: Option<i32>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Failed to parse {0}: {1}")]
    Parse(String, serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl MovieRecord {
    /// Converts the record, failing on the first genre outside the known set.
    pub fn into_movie(self) -> Result<Movie, String> {
        let mut genres = Vec::with_capacity(self.genres.len());
        for name in &self.genres {
            let genre = Genre::parse(name).ok_or_else(|| name.clone())?;
            if !genres.contains(&genre) {
                genres.push(genre);
            }
        }

        let year = self
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<i32>().ok());

        Ok(Movie {
            id: self.id,
            title: self.title.trim().to_string(),
            year,
            poster: self.poster_path.filter(|p| !p.is_empty()),
            overview: self.overview.filter(|o| !o.trim().is_empty()),
            runtime: self.runtime.filter(|r| *r > 0),
            rating: self.vote_average,
            popularity: self.popularity,
            genres,
        })
    }
}

pub fn read_records(path: &Path) -> Result<Vec<MovieRecord>, ImportError> {
    let name = path.to_string_lossy().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ImportError::Read(name.clone(), e))?;
    serde_json::from_str(&content).map_err(|e| ImportError::Parse(name, e))
}

/// Upserts every valid record. Records with unknown genres are skipped
/// and logged.
pub async fn import_records<R: MovieRepo + ?Sized>(
    repo: &R,
    records: Vec<MovieRecord>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    for record in records {
        let id = record.id;
        match record.into_movie() {
            Ok(movie) => {
                repo.upsert_movie(&movie).await?;
                summary.imported += 1;
            }
            Err(genre) => {
                warn!("Skipping movie {}: unknown genre {:?}", id, genre);
                summary.skipped += 1;
            }
        }
    }

    info!(
        "Imported {} movies, skipped {}",
        summary.imported, summary.skipped
    );
    Ok(summary)
}
