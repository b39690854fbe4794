use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::{Result, RetrievalError};

pub const DEFAULT_PAGE_PATTERN: &str = "*_page_*.txt";
pub const DEFAULT_CACHE_EXTENSION: &str = "vec";
pub const TEXT_EXTENSION: &str = "txt";

/// Naming rules tying a page file to its vector cache entry. Both live in the
/// same directory and share a base name.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pattern: Pattern,
    cache_extension: String,
}

impl PageLayout {
    pub fn new(pattern: &str, cache_extension: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|e| {
            RetrievalError::InvalidLayout(format!("page pattern {pattern:?}: {e}"))
        })?;
        let cache_extension = cache_extension.trim().trim_start_matches('.').to_string();
        if cache_extension.is_empty() {
            return Err(RetrievalError::InvalidLayout(
                "cache extension must not be empty".to_string(),
            ));
        }
        if cache_extension.eq_ignore_ascii_case(TEXT_EXTENSION) {
            return Err(RetrievalError::InvalidLayout(format!(
                "cache extension {cache_extension:?} would overwrite page text"
            )));
        }
        Ok(Self {
            pattern,
            cache_extension,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn cache_extension(&self) -> &str {
        &self.cache_extension
    }

    /// Matches the file name only; directory nesting is irrelevant.
    pub fn is_page_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.pattern.matches(name))
            .unwrap_or(false)
    }

    pub fn is_cache_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == self.cache_extension)
            .unwrap_or(false)
    }

    pub fn cache_path_for(&self, page: &Path) -> PathBuf {
        page.with_extension(&self.cache_extension)
    }

    pub fn text_path_for(&self, cache: &Path) -> PathBuf {
        cache.with_extension(TEXT_EXTENSION)
    }
}

/// Reads a page as UTF-8. Undecodable bytes are an encode failure rather
/// than an I/O one, since the file itself was readable.
pub fn read_page_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        RetrievalError::Encode(format!("{} is not valid UTF-8: {e}", path.display()))
    })
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            pattern: Pattern::new(DEFAULT_PAGE_PATTERN).expect("default page pattern is valid"),
            cache_extension: DEFAULT_CACHE_EXTENSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_page_markers_only() {
        let layout = PageLayout::default();
        assert!(layout.is_page_file(Path::new("a/b/report_page_3.txt")));
        assert!(layout.is_page_file(Path::new("report_page_3_upper.txt")));
        assert!(!layout.is_page_file(Path::new("report.txt")));
        assert!(!layout.is_page_file(Path::new("report_page_3.vec")));
        assert!(!layout.is_page_file(Path::new("dir_page_1/readme.txt")));
    }

    #[test]
    fn cache_and_text_paths_share_base_name() {
        let layout = PageLayout::default();
        let page = Path::new("corpus/doc1_page_2.txt");
        let cache = layout.cache_path_for(page);
        assert_eq!(cache, Path::new("corpus/doc1_page_2.vec"));
        assert!(layout.is_cache_file(&cache));
        assert_eq!(layout.text_path_for(&cache), page);
    }

    #[test]
    fn rejects_unusable_extensions() {
        assert!(PageLayout::new("*_page_*.txt", "").is_err());
        assert!(PageLayout::new("*_page_*.txt", ".TXT").is_err());
        assert!(PageLayout::new("[", "vec").is_err());
        let layout = PageLayout::new("*_p*.txt", ".emb").unwrap();
        assert_eq!(layout.cache_extension(), "emb");
    }

    #[test]
    fn page_text_must_be_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a_page_1.txt");
        let bad = dir.path().join("a_page_2.txt");
        fs::write(&good, "第一頁").unwrap();
        fs::write(&bad, [0xff, 0xfe, 0x00]).unwrap();
        assert_eq!(read_page_text(&good).unwrap(), "第一頁");
        assert!(matches!(read_page_text(&bad), Err(RetrievalError::Encode(_))));
        assert!(matches!(
            read_page_text(&dir.path().join("gone_page_1.txt")),
            Err(RetrievalError::Io { .. })
        ));
    }
}
