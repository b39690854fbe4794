use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use pagevec_core::{read_page_text, CacheEntry, PageLayout, Result, RetrievalError};

use crate::embedding::TextEncoder;

#[derive(Debug, Default)]
pub struct BuildReport {
    pub discovered: usize,
    pub written: Vec<PathBuf>,
    pub already_cached: usize,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct BuildFailure {
    pub path: PathBuf,
    pub error: RetrievalError,
}

#[derive(Debug)]
pub enum Staleness {
    ContentChanged,
    ModelChanged { recorded: String },
    MissingText,
    Unreadable(RetrievalError),
}

impl Staleness {
    pub fn label(&self) -> &'static str {
        match self {
            Staleness::ContentChanged => "content-changed",
            Staleness::ModelChanged { .. } => "model-changed",
            Staleness::MissingText => "missing-text",
            Staleness::Unreadable(_) => "unreadable",
        }
    }
}

#[derive(Debug)]
pub struct StaleEntry {
    pub cache_path: PathBuf,
    pub text_path: PathBuf,
    pub reason: Staleness,
}

/// Populates the vector cache for every page file under a corpus root.
///
/// An existing cache file is never recomputed or compared with its page, so
/// repeated runs only touch pages that have no entry yet. Failures are
/// collected per page and never stop the batch.
pub struct CacheBuilder<'a, E: TextEncoder + ?Sized> {
    encoder: &'a E,
    layout: PageLayout,
}

impl<'a, E: TextEncoder + ?Sized> CacheBuilder<'a, E> {
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

    pub fn build(&self, root: &Path) -> Result<BuildReport> {
        ensure_root(root)?;
        let mut report = BuildReport::default();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    warn!("skipping unreadable path {}: {err}", path.display());
                    report.failures.push(BuildFailure {
                        error: RetrievalError::io(&path, err.into()),
                        path,
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.layout.is_page_file(entry.path()) {
                continue;
            }
            report.discovered += 1;
            match self.index_page(entry.path()) {
                Ok(Some(cache_path)) => {
                    debug!("cached {}", cache_path.display());
                    report.written.push(cache_path);
                }
                Ok(None) => report.already_cached += 1,
                Err(error) => {
                    warn!("failed to index {}: {error}", entry.path().display());
                    report.failures.push(BuildFailure {
                        path: entry.path().to_path_buf(),
                        error,
                    });
                }
            }
        }
        info!(
            root = %root.display(),
            discovered = report.discovered,
            written = report.written.len(),
            already_cached = report.already_cached,
            failed = report.failures.len(),
            "vector cache build finished"
        );
        Ok(report)
    }

    /// Returns the written cache path, or `None` when an entry already exists.
    pub fn index_page(&self, page: &Path) -> Result<Option<PathBuf>> {
        let cache_path = self.layout.cache_path_for(page);
        if cache_path
            .try_exists()
            .map_err(|e| RetrievalError::io(&cache_path, e))?
        {
            return Ok(None);
        }
        let text = read_page_text(page)?;
        let vector = self.encoder.encode(&text)?;
        CacheEntry::new(self.encoder.model_id(), &text, vector).save(&cache_path)?;
        Ok(Some(cache_path))
    }

    /// Lists cache entries that no longer describe their page. Nothing is
    /// rewritten or removed.
    pub fn audit(&self, root: &Path) -> Result<Vec<StaleEntry>> {
        ensure_root(root)?;
        let mut stale = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    stale.push(self.unreadable_walk_entry(err, root));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.layout.is_cache_file(entry.path()) {
                continue;
            }
            let cache_path = entry.into_path();
            let text_path = self.layout.text_path_for(&cache_path);
            if let Some(reason) = self.check_entry(&cache_path, &text_path) {
                stale.push(StaleEntry {
                    cache_path,
                    text_path,
                    reason,
                });
            }
        }
        if !stale.is_empty() {
            warn!(count = stale.len(), "stale vector cache entries found");
        }
        Ok(stale)
    }

    fn unreadable_walk_entry(&self, err: walkdir::Error, root: &Path) -> StaleEntry {
        let path = err.path().unwrap_or(root).to_path_buf();
        warn!("cannot audit {}: {err}", path.display());
        StaleEntry {
            text_path: self.layout.text_path_for(&path),
            reason: Staleness::Unreadable(RetrievalError::io(&path, err.into())),
            cache_path: path,
        }
    }

    fn check_entry(&self, cache_path: &Path, text_path: &Path) -> Option<Staleness> {
        if !text_path.is_file() {
            return Some(Staleness::MissingText);
        }
        let cached = match CacheEntry::load(cache_path) {
            Ok(cached) => cached,
            Err(err) => return Some(Staleness::Unreadable(err)),
        };
        if cached.model_id != self.encoder.model_id() {
            return Some(Staleness::ModelChanged {
                recorded: cached.model_id,
            });
        }
        match read_page_text(text_path) {
            Ok(text) if cached.matches_text(&text) => None,
            Ok(_) => Some(Staleness::ContentChanged),
            Err(err) => Some(Staleness::Unreadable(err)),
        }
    }
}

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(RetrievalError::MissingRoot(root.to_path_buf()))
    }
}
