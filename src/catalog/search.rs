use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::sort_name::make_sort_name;
use crate::db::Movie;

/// Full text index over the movie catalog.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    id_field: Field,
    title_field: Field,
    sort_title_field: Field,
    overview_field: Field,
    genres_field: Field,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: i64,
    pub score: f32,
}

impl SearchIndex {
    pub fn new() -> Result<Self, SearchError> {
        let mut schema_builder = Schema::builder();

        let id_field = schema_builder.add_u64_field("id", INDEXED | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let sort_title_field = schema_builder.add_text_field("sort_title", STRING | STORED);
        let overview_field = schema_builder.add_text_field("overview", TEXT);
        let genres_field = schema_builder.add_text_field("genres", TEXT | STORED);

        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let writer = index.writer(50_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            id_field,
            title_field,
            sort_title_field,
            overview_field,
            genres_field,
        })
    }

    /// Replace the indexed documents with `movies`.
    pub async fn rebuild(&self, movies: &[Movie]) -> Result<(), SearchError> {
        debug!("Rebuilding search index with {} movies", movies.len());

        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;

        for movie in movies {
            let mut doc = TantivyDocument::default();
            doc.add_u64(self.id_field, movie.id as u64);
            doc.add_text(self.title_field, &movie.title);
            doc.add_text(self.sort_title_field, make_sort_name(&movie.title));

            if let Some(ref overview) = movie.overview {
                doc.add_text(self.overview_field, overview);
            }

            for genre in &movie.genres {
                doc.add_text(self.genres_field, genre.label());
            }

            writer.add_document(doc)?;
        }

        writer.commit()?;
        self.reader.reload()?;

        debug!("Search index rebuilt");
        Ok(())
    }

    /// Best matches for `query_str`, highest score first. Equal scores are
    /// ordered by sort title.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut query_parser = QueryParser::for_index(
            &self.index,
            vec![self.title_field, self.overview_field, self.genres_field],
        );
        query_parser.set_field_boost(self.title_field, 3.0);

        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            warn!("Search query {:?} partially parsed: {:?}", query_str, errors);
        }

        self.collect(&*query, limit)
    }

    /// Movies sharing genres with `movie_id`, excluding the movie itself.
    pub fn find_similar(&self, movie_id: i64, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let searcher = self.reader.searcher();

        let id_term = Term::from_field_u64(self.id_field, movie_id as u64);
        let id_query = TermQuery::new(id_term.clone(), IndexRecordOption::Basic);
        let top_docs = searcher.search(&id_query, &TopDocs::with_limit(1))?;

        let Some((_score, doc_address)) = top_docs.first().copied() else {
            return Ok(Vec::new());
        };

        let source: TantivyDocument = searcher.doc(doc_address)?;
        let mut tokens: Vec<String> = source
            .get_all(self.genres_field)
            .filter_map(|v| v.as_str())
            .flat_map(|label| label.split_whitespace().map(|t| t.to_lowercase()).collect::<Vec<_>>())
            .collect();
        tokens.sort();
        tokens.dedup();

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in &tokens {
            let term = Term::from_field_text(self.genres_field, token);
            subqueries.push((
                Occur::Should,
                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
            ));
        }
        if subqueries.is_empty() {
            return Ok(Vec::new());
        }
        subqueries.push((
            Occur::MustNot,
            Box::new(TermQuery::new(id_term, IndexRecordOption::Basic)),
        ));

        self.collect(&BooleanQuery::new(subqueries), limit)
    }

    fn collect(&self, query: &dyn Query, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::new();
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;

            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_u64()) {
                let sort_title = doc
                    .get_first(self.sort_title_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                results.push((
                    sort_title,
                    SearchResult {
                        id: id as i64,
                        score,
                    },
                ));
            }
        }

        results.sort_by(|(a_sort, a), (b_sort, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_sort.cmp(b_sort))
        });

        Ok(results.into_iter().map(|(_, r)| r).collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}
