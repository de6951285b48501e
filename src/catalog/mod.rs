pub mod import;
pub mod search;
pub mod sort_name;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::db::{DbError, Movie, MovieRepo, SqliteRepository};
pub use import::{ImportError, ImportSummary, MovieRecord};
pub use search::{SearchError, SearchIndex, SearchResult};
pub use sort_name::make_sort_name;

/// The movie table plus its full text index.
pub struct Catalog {
    db: Arc<SqliteRepository>,
    search_index: SearchIndex,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

impl Catalog {
    pub fn new(db: Arc<SqliteRepository>) -> Result<Self, CatalogError> {
        Ok(Self {
            db,
            search_index: SearchIndex::new()?,
        })
    }

    /// Re-read every movie and rebuild the index.
    pub async fn reindex(&self) -> Result<usize, CatalogError> {
        let movies = self.db.list_movies().await?;
        self.search_index.rebuild(&movies).await?;
        info!("Indexed {} movies", movies.len());
        Ok(movies.len())
    }

    /// Movies matching `query`, best first.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Movie>, CatalogError> {
        let ids: Vec<i64> = self
            .search_index
            .search(query, limit)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        Ok(self.db.get_movies_by_ids(&ids).await?)
    }

    pub async fn similar(&self, movie_id: i64, limit: usize) -> Result<Vec<Movie>, CatalogError> {
        let ids: Vec<i64> = self
            .search_index
            .find_similar(movie_id, limit)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        Ok(self.db.get_movies_by_ids(&ids).await?)
    }

    /// Delete a movie. Its list entries and recommendation links go with it.
    pub async fn remove_movie(&self, movie_id: i64) -> Result<Movie, CatalogError> {
        let movie = self.db.get_movie(movie_id).await?;
        self.db.delete_movie(movie_id).await?;
        self.reindex().await?;
        info!("Removed movie {} ({})", movie.id, movie.title);
        Ok(movie)
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, CatalogError> {
        let records = import::read_records(path)?;
        let summary = import::import_records(self.db.as_ref(), records).await?;
        self.reindex().await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Genre;

    #[tokio::test]
    async fn test_search_returns_movies_in_rank_order() {
        let db = Arc::new(SqliteRepository::new("sqlite::memory:").await.unwrap());
        db.migrate().await.unwrap();
        for (id, title) in [(1, "Jaws"), (2, "Jaws 2"), (3, "Up")] {
            db.upsert_movie(&Movie {
                id,
                title: title.to_string(),
                year: None,
                poster: None,
                overview: None,
                runtime: None,
                rating: None,
                popularity: None,
                genres: vec![Genre::Adventure],
            })
            .await
            .unwrap();
        }

        let catalog = Catalog::new(db).unwrap();
        assert_eq!(catalog.reindex().await.unwrap(), 3);

        let ids: Vec<i64> = catalog.search("jaws", 10).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&2));

        let similar = catalog.similar(3, 10).await.unwrap();
        assert_eq!(similar.len(), 2);

        let removed = catalog.remove_movie(2).await.unwrap();
        assert_eq!(removed.title, "Jaws 2");
        let ids: Vec<i64> = catalog.search("jaws", 10).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);
        assert!(matches!(
            catalog.remove_movie(2).await,
            Err(CatalogError::Database(DbError::NotFound(_)))
        ));
    }
}
