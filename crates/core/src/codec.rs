use std::fs;
use std::io::Write;
use std::path::Path;

use bytemuck::{cast_slice, pod_collect_to_vec};
use tempfile::NamedTempFile;

use crate::error::{Result, RetrievalError};

pub const CACHE_MAGIC: &[u8; 4] = b"PGVC";
pub const CACHE_VERSION: u8 = 1;

const FLAG_BIG_ENDIAN: u8 = 0b0000_0001;
// magic, version, flags, model id length, dimensions, content hash
const HEADER_LEN: usize = 4 + 1 + 1 + 2 + 4 + 32;

pub type ContentHash = [u8; 32];

pub fn content_hash(text: &str) -> ContentHash {
    *blake3::hash(text.as_bytes()).as_bytes()
}

/// One persisted page vector together with the provenance needed to spot
/// stale or foreign entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub model_id: String,
    pub content_hash: ContentHash,
    pub vector: Vec<f32>,
}

impl CacheEntry {
    pub fn new(model_id: impl Into<String>, text: &str, vector: Vec<f32>) -> Self {
        Self {
            model_id: model_id.into(),
            content_hash: content_hash(text),
            vector,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn matches_text(&self, text: &str) -> bool {
        self.content_hash == content_hash(text)
    }

    /// Fails when the model id does not fit the 16-bit length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let model = self.model_id.as_bytes();
        let model_len = u16::try_from(model.len()).map_err(|_| {
            RetrievalError::Encode(format!(
                "model id is {} bytes, at most {} fit in a cache entry",
                model.len(),
                u16::MAX
            ))
        })?;
        let payload = cast_slice::<f32, u8>(&self.vector);
        let mut out = Vec::with_capacity(HEADER_LEN + model.len() + payload.len());
        out.extend_from_slice(CACHE_MAGIC);
        out.push(CACHE_VERSION);
        out.push(if cfg!(target_endian = "big") {
            FLAG_BIG_ENDIAN
        } else {
            0
        });
        out.extend_from_slice(&model_len.to_le_bytes());
        out.extend_from_slice(&(self.vector.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.content_hash);
        out.extend_from_slice(model);
        out.extend_from_slice(payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        let fail = |reason: String| RetrievalError::decode(origin, reason);
        if bytes.len() < HEADER_LEN {
            return Err(fail(format!("truncated header ({} bytes)", bytes.len())));
        }
        if &bytes[..4] != CACHE_MAGIC {
            return Err(fail("bad magic".to_string()));
        }
        if bytes[4] != CACHE_VERSION {
            return Err(fail(format!("unsupported version {}", bytes[4])));
        }
        let stored_big_endian = bytes[5] & FLAG_BIG_ENDIAN != 0;
        let model_len = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut content_hash = [0u8; 32];
        content_hash.copy_from_slice(&bytes[12..HEADER_LEN]);
        if dims == 0 {
            return Err(fail("empty vector".to_string()));
        }
        let payload_start = HEADER_LEN + model_len;
        let expected_len = dims
            .checked_mul(4)
            .and_then(|payload| payload.checked_add(payload_start))
            .ok_or_else(|| fail(format!("dimension count {dims} overflows")))?;
        if bytes.len() != expected_len {
            return Err(fail(format!(
                "expected {expected_len} bytes for {dims} dimensions, found {}",
                bytes.len()
            )));
        }
        let model_id = std::str::from_utf8(&bytes[HEADER_LEN..payload_start])
            .map_err(|_| fail("model id is not utf-8".to_string()))?
            .to_string();
        let mut vector = pod_collect_to_vec::<u8, f32>(&bytes[payload_start..]);
        if stored_big_endian != cfg!(target_endian = "big") {
            for value in vector.iter_mut() {
                *value = f32::from_bits(value.to_bits().swap_bytes());
            }
        }
        if let Some(idx) = vector.iter().position(|v| !v.is_finite()) {
            return Err(fail(format!("non-finite value at index {idx}")));
        }
        Ok(Self {
            model_id,
            content_hash,
            vector,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
        Self::from_bytes(&bytes, path)
    }

    /// Writes through a temporary sibling and renames it into place, so a
    /// reader never sees a half-written entry.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RetrievalError::io(dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| RetrievalError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| RetrievalError::io(path, e.error))?;
        Ok(())
    }
}
