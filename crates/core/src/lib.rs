mod codec;
mod embedding;
mod error;
mod page;
mod similarity;

pub use codec::{content_hash, CacheEntry, ContentHash, CACHE_MAGIC, CACHE_VERSION};
pub use embedding::{HashEmbedder, HashEmbedderConfig};
pub use error::{Result, RetrievalError};
pub use page::{
    read_page_text, PageLayout, DEFAULT_CACHE_EXTENSION, DEFAULT_PAGE_PATTERN, TEXT_EXTENSION,
};
pub use similarity::{cosine_similarity, TopK};
