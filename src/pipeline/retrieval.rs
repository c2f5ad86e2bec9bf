//! Retrieval corpus boundary: title search and chunk fetch.
//!
//! The pipeline only sees the `Corpus` trait. `InMemoryCorpus` backs tests
//! and small offline collections.

use serde_json::json;
use thiserror::Error;

use super::joints::types::Chunk;

/// Default cap on titles returned by one `InMemoryCorpus` search.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorpusError {
    #[error("Corpus unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid corpus query: {0}")]
    InvalidQuery(String),
}

/// Retrieval backend abstraction (allows mocking)
pub trait Corpus: Send + Sync {
    /// Article titles relevant to `term`, best first.
    fn search_titles(&self, term: &str) -> Result<Vec<String>, CorpusError>;

    /// Chunks of the named articles, in `titles` order.
    fn fetch_chunks(&self, titles: &[String]) -> Result<Vec<Chunk>, CorpusError>;
}

struct StoredArticle {
    title: String,
    folded_title: String,
    passages: Vec<String>,
}

/// Corpus held entirely in memory. Title search is word containment:
/// every word of the term must occur in the case-folded title.
pub struct InMemoryCorpus {
    articles: Vec<StoredArticle>,
    search_limit: usize,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            articles: Vec::new(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn add_article(&mut self, title: &str, passages: &[&str]) {
        self.articles.push(StoredArticle {
            title: title.to_string(),
            folded_title: title.to_lowercase(),
            passages: passages.iter().map(|p| p.to_string()).collect(),
        });
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

impl Corpus for InMemoryCorpus {
    fn search_titles(&self, term: &str) -> Result<Vec<String>, CorpusError> {
        let folded = term.trim().to_lowercase();
        let words: Vec<&str> = folded.split_whitespace().collect();
        if words.is_empty() {
            return Err(CorpusError::InvalidQuery("empty search term".into()));
        }

        Ok(self
            .articles
            .iter()
            .filter(|a| words.iter().all(|w| a.folded_title.contains(w)))
            .take(self.search_limit)
            .map(|a| a.title.clone())
            .collect())
    }

    fn fetch_chunks(&self, titles: &[String]) -> Result<Vec<Chunk>, CorpusError> {
        let mut chunks = Vec::new();
        for title in titles {
            let Some(article) = self.articles.iter().find(|a| &a.title == title) else {
                tracing::debug!(title = %title, "Requested article not in corpus");
                continue;
            };
            for (index, passage) in article.passages.iter().enumerate() {
                let mut chunk = Chunk::new(&article.title, passage);
                chunk.metadata.extra.insert("chunk_index".into(), json!(index));
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> InMemoryCorpus {
        let mut corpus = InMemoryCorpus::new();
        corpus.add_article("Nikola Tesla", &["Tesla was born in 1856.", "He died in 1943."]);
        corpus.add_article("Thomas Edison", &["Edison was born in 1847."]);
        corpus.add_article("Tesla, Inc.", &["An electric vehicle maker."]);
        corpus
    }

    #[test]
    fn search_matches_all_words_case_insensitively() {
        let corpus = corpus();
        assert_eq!(
            corpus.search_titles("tesla").unwrap(),
            vec!["Nikola Tesla", "Tesla, Inc."]
        );
        assert_eq!(corpus.search_titles("Nikola TESLA").unwrap(), vec!["Nikola Tesla"]);
        assert!(corpus.search_titles("Edison (person)").unwrap().is_empty());
    }

    #[test]
    fn search_respects_limit() {
        let corpus = corpus().with_search_limit(1);
        assert_eq!(corpus.search_titles("tesla").unwrap().len(), 1);
    }

    #[test]
    fn blank_term_is_rejected() {
        assert!(matches!(
            corpus().search_titles("   "),
            Err(CorpusError::InvalidQuery(_))
        ));
    }

    #[test]
    fn fetch_preserves_title_order_and_indexes_chunks() {
        let corpus = corpus();
        let chunks = corpus
            .fetch_chunks(&[
                "Thomas Edison".to_string(),
                "Missing".to_string(),
                "Nikola Tesla".to_string(),
            ])
            .unwrap();
        let titles: Vec<&str> = chunks.iter().map(|c| c.metadata.title.as_str()).collect();
        assert_eq!(titles, vec!["Thomas Edison", "Nikola Tesla", "Nikola Tesla"]);
        assert_eq!(chunks[2].metadata.extra["chunk_index"], 1);
        assert!(chunks.iter().all(|c| c.filter_score.is_none()));
    }

    #[test]
    fn empty_corpus_reports_len() {
        let empty = InMemoryCorpus::default();
        assert!(empty.is_empty());
        assert_eq!(corpus().len(), 3);
    }
}
