use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use pagevec_core::{
    cosine_similarity, read_page_text, CacheEntry, PageLayout, Result, RetrievalError, TopK,
};

use crate::embedding::TextEncoder;
use crate::format::render_blocks;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub score: f32,
    pub path: PathBuf,
    pub content: String,
}

/// A cache entry left out of scoring, with the reason.
#[derive(Debug)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub error: RetrievalError,
}

#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<ScoredResult>,
    pub skipped: Vec<SkippedEntry>,
    pub scanned: usize,
}

/// Exhaustive cosine search over the cache files below a folder.
pub struct SearchEngine<'a, E: TextEncoder + ?Sized> {
    encoder: &'a E,
    layout: PageLayout,
}

impl<'a, E: TextEncoder + ?Sized> SearchEngine<'a, E> {
    pub fn new(encoder: &'a E) -> Self {
        Self {
            encoder,
            layout: PageLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Scores every cache entry under `folder` against `query` and returns
    /// at most `k` results, best first.
    ///
    /// Entries that cannot be decoded or do not match the query vector are
    /// skipped and listed in the outcome. A selected entry whose page text
    /// cannot be read fails the whole call with that page's path.
    pub fn search(&self, query: &str, folder: &Path, k: usize) -> Result<SearchOutcome> {
        let query_vector = self.encoder.encode(query)?;
        let mut outcome = SearchOutcome::default();
        if !folder.is_dir() {
            debug!("search folder {} does not exist", folder.display());
            return Ok(outcome);
        }
        let mut top = TopK::new(k);
        for entry in WalkDir::new(folder).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(folder).to_path_buf();
                    warn!("skipping unreadable path {}: {err}", path.display());
                    outcome.skipped.push(SkippedEntry {
                        error: RetrievalError::io(&path, err.into()),
                        path,
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.layout.is_cache_file(entry.path()) {
                continue;
            }
            outcome.scanned += 1;
            match self.score_entry(&query_vector, entry.path()) {
                Ok(score) => {
                    top.push(score, entry.into_path());
                }
                Err(error) => {
                    warn!("skipping cache entry: {error}");
                    outcome.skipped.push(SkippedEntry {
                        path: entry.into_path(),
                        error,
                    });
                }
            }
        }
        for (score, cache_path) in top.into_sorted_vec() {
            let path = self.layout.text_path_for(&cache_path);
            let content = read_page_text(&path)?;
            outcome.results.push(ScoredResult {
                score,
                path,
                content,
            });
        }
        debug!(
            scanned = outcome.scanned,
            returned = outcome.results.len(),
            skipped = outcome.skipped.len(),
            "search finished"
        );
        Ok(outcome)
    }

    /// Rendered result blocks in rank order.
    pub fn find_similar(&self, query: &str, folder: &Path, k: usize) -> Result<Vec<String>> {
        let outcome = self.search(query, folder, k)?;
        Ok(render_blocks(&outcome.results))
    }

    fn score_entry(&self, query_vector: &[f32], cache_path: &Path) -> Result<f32> {
        let cached = CacheEntry::load(cache_path)?;
        if cached.dimensions() != query_vector.len() {
            return Err(RetrievalError::DimensionMismatch {
                path: cache_path.to_path_buf(),
                expected: query_vector.len(),
                found: cached.dimensions(),
            });
        }
        if cached.model_id != self.encoder.model_id() {
            return Err(RetrievalError::ModelMismatch {
                path: cache_path.to_path_buf(),
                expected: self.encoder.model_id().to_string(),
                found: cached.model_id,
            });
        }
        Ok(cosine_similarity(query_vector, &cached.vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CacheBuilder;
    use crate::embedding::EmbeddingClient;
    use pagevec_core::HashEmbedderConfig;
    use std::fs;
    use tempfile::tempdir;

    fn corpus(pages: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for (name, text) in pages {
            fs::write(dir.path().join(name), text).unwrap();
        }
        CacheBuilder::new(&EmbeddingClient::hash())
            .build(dir.path())
            .unwrap();
        dir
    }

    #[test]
    fn zero_k_and_missing_folder_return_nothing() {
        let dir = corpus(&[("a_page_1.txt", "alpha")]);
        let encoder = EmbeddingClient::hash();
        let engine = SearchEngine::new(&encoder);
        assert!(engine.search("alpha", dir.path(), 0).unwrap().results.is_empty());
        let missing = engine
            .search("alpha", &dir.path().join("nope"), 3)
            .unwrap();
        assert!(missing.results.is_empty());
        assert_eq!(missing.scanned, 0);
    }

    #[test]
    fn corrupt_entry_is_skipped_and_reported() {
        let dir = corpus(&[("a_page_1.txt", "alpha"), ("a_page_2.txt", "beta")]);
        fs::write(dir.path().join("a_page_2.vec"), b"garbage").unwrap();
        let encoder = EmbeddingClient::hash();
        let outcome = SearchEngine::new(&encoder)
            .search("alpha", dir.path(), 5)
            .unwrap();
        assert_eq!(outcome.scanned, 2);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(
            outcome.skipped[0].error,
            RetrievalError::Decode { .. }
        ));
    }

    #[test]
    fn foreign_dimensions_are_reported_not_truncated() {
        let dir = corpus(&[("a_page_1.txt", "alpha")]);
        let small = EmbeddingClient::hash_with(HashEmbedderConfig {
            dimensions: 16,
            seed: 1337,
        });
        let outcome = SearchEngine::new(&small)
            .search("alpha", dir.path(), 5)
            .unwrap();
        assert!(outcome.results.is_empty());
        match &outcome.skipped[0].error {
            RetrievalError::DimensionMismatch {
                expected, found, ..
            } => {
                assert_eq!((*expected, *found), (16, 256));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn entries_from_another_model_are_skipped() {
        let dir = corpus(&[("a_page_1.txt", "alpha")]);
        let reseeded = EmbeddingClient::hash_with(HashEmbedderConfig {
            dimensions: 256,
            seed: 2,
        });
        let outcome = SearchEngine::new(&reseeded)
            .search("alpha", dir.path(), 5)
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.scanned, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, dir.path().join("a_page_1.vec"));
        match &outcome.skipped[0].error {
            RetrievalError::ModelMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, "hash-256-2");
                assert_eq!(found, "hash-256-1337");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn empty_query_is_an_encode_error() {
        let dir = corpus(&[("a_page_1.txt", "alpha")]);
        let encoder = EmbeddingClient::hash();
        let err = SearchEngine::new(&encoder)
            .search("  ", dir.path(), 5)
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Encode(_)));
    }

    #[test]
    fn find_similar_renders_ranked_blocks() {
        let dir = corpus(&[("a_page_1.txt", "alpha protocol"), ("a_page_2.txt", "beta")]);
        let encoder = EmbeddingClient::hash();
        let blocks = SearchEngine::new(&encoder)
            .find_similar("alpha protocol", dir.path(), 1)
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].starts_with("Knowledgebase Top 1 file: "));
        assert!(blocks[0].contains("a_page_1.txt"));
        assert!(blocks[0].contains("Content: alpha protocol"));
    }
}
