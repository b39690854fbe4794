use crate::error::{Result, RetrievalError};

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 256,
            seed: 1337,
        }
    }
}

/// Feature-hashing embedder. Buckets are derived from blake3 so vectors stay
/// identical across processes and toolchain versions.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn model_id(&self) -> String {
        format!("hash-{}-{}", self.dimensions(), self.config.seed)
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(RetrievalError::Encode(
                "input has no indexable tokens".to_string(),
            ));
        }
        let mut vector = vec![0f32; self.dimensions()];
        for token in &tokens {
            let bucket = self.bucket_for(token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.config.seed.to_le_bytes());
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(head) % self.dimensions() as u64) as usize
    }
}

/// Lowercased words for space-delimited scripts, character bigrams for
/// scripts written without word separators.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut spaced = String::new();
        let mut unspaced: Vec<char> = Vec::new();
        for ch in word.chars() {
            if is_unspaced_script(ch) {
                flush_word(&mut spaced, &mut tokens);
                unspaced.push(ch);
            } else {
                flush_bigrams(&mut unspaced, &mut tokens);
                spaced.extend(ch.to_lowercase());
            }
        }
        flush_word(&mut spaced, &mut tokens);
        flush_bigrams(&mut unspaced, &mut tokens);
    }
    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_bigrams(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => tokens.push(run[0].to_string()),
        _ => tokens.extend(run.windows(2).map(|pair| pair.iter().collect::<String>())),
    }
    run.clear();
}

fn is_unspaced_script(ch: char) -> bool {
    matches!(
        ch,
        '\u{3040}'..='\u{30ff}'
            | '\u{3400}'..='\u{4dbf}'
            | '\u{4e00}'..='\u{9fff}'
            | '\u{f900}'..='\u{faff}'
            | '\u{0e00}'..='\u{0e7f}'
    )
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
