//! Local feature-hashing embedder.
//!
//! Maps text into a fixed number of buckets using FNV-1a hashes of word
//! unigrams and adjacent bigrams. No model files, no network, fully
//! deterministic: the same text always yields the same vector bit for bit.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::similarity::normalize;

/// Batches larger than this are embedded on the blocking pool.
const BLOCKING_BATCH_THRESHOLD: usize = 64;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Function words that carry no topical signal.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "doing", "for",
    "from", "had", "has", "have", "having", "he", "her", "here", "him", "his", "how", "i", "if",
    "in", "into", "is", "it", "its", "just", "me", "my", "no", "not", "of", "on", "or", "our",
    "please", "she", "should", "so", "some", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "too", "up", "us", "very", "was", "we",
    "were", "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would",
    "you", "your",
];

/// Deterministic hashing embedding provider.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
    model: String,
}

impl HashingProvider {
    /// Bucket count used when none is configured.
    pub const DEFAULT_DIMENSION: usize = 2048;

    /// Create a provider producing vectors of `dimension` buckets.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbeddingError::ModelUnavailable(
                "hashing embedder needs at least one bucket".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            model: format!("hashing-v1-d{dimension}"),
        })
    }

    /// Embed synchronously. The async trait methods delegate here.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let tokens = tokenize(text);

        // BTreeMap keeps accumulation order fixed so float sums are reproducible.
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_default() += 1;
        }
        for pair in tokens.windows(2) {
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_default() += 1;
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for (feature, tf) in &counts {
            let hash = fnv1a(feature.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign * (1.0 + (*tf as f32).ln());
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
            model: format!("hashing-v1-d{}", Self::DEFAULT_DIMENSION),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.len() <= BLOCKING_BATCH_THRESHOLD {
            return Ok(texts.iter().map(|t| self.embed_text(t)).collect());
        }

        debug!("Embedding {} texts on the blocking pool", texts.len());
        let provider = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|t| provider.embed_text(t))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| EmbeddingError::Worker(e.to_string()))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Whether a lowercased word carries no topic on its own.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercased alphanumeric words with stopwords removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !is_stopword(word))
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
