//! Configuration for the retrieval engine.

use std::sync::Arc;
use std::time::Duration;

use member_qa_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingProvider, HashingProvider, OpenAIProvider,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, RetrievalError};

/// Default relevance threshold.
///
/// Picked empirically for the hashing embedder: paraphrased questions about
/// a message land around 0.4–0.6, unrelated ones below 0.2. It is a fixed
/// cut-off, not a learned or calibrated value.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.35;

/// Default threshold for questions restricted to a named member.
///
/// Lower than [`DEFAULT_RELEVANCE_THRESHOLD`]: the name has already narrowed
/// the candidates, so weaker topical overlap is enough.
pub const DEFAULT_MEMBER_THRESHOLD: f32 = 0.15;

/// Default deadline for a single answer.
pub const DEFAULT_ANSWER_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a match to be returned.
    pub relevance_threshold: f32,

    /// Minimum cosine similarity when the question names a member.
    pub member_threshold: f32,

    /// Restrict questions that name a member to that member's messages.
    pub member_matching: bool,

    /// Deadline for one `answer` call, in milliseconds.
    pub answer_timeout_ms: u64,

    /// Re-fetch and rebuild the corpus on this interval. Off when unset.
    pub refresh_interval_secs: Option<u64>,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,
}

impl RetrievalConfig {
    /// Set the relevance threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("relevance_threshold", self.relevance_threshold),
            ("member_threshold", self.member_threshold),
        ] {
            if !value.is_finite() || value.abs() > 1.0 {
                return Err(RetrievalError::Config(format!(
                    "{name} must be within [-1, 1], got {value}"
                )));
            }
        }
        if self.answer_timeout_ms == 0 {
            return Err(RetrievalError::Config(
                "answer_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimension == Some(0) {
            return Err(RetrievalError::Config(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            member_threshold: DEFAULT_MEMBER_THRESHOLD,
            member_matching: true,
            answer_timeout_ms: DEFAULT_ANSWER_TIMEOUT_MS,
            refresh_interval_secs: None,
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings (OpenAI only).
    pub model: Option<String>,

    /// Vector length. Provider default when unset.
    pub dimension: Option<usize>,

    /// API base URL (OpenAI only).
    pub base_url: Option<String>,

    /// API key (OpenAI only). Falls back to `OPENAI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum inputs per embedding request (OpenAI only).
    pub batch_size: usize,

    /// Whether to cache remote embeddings across rebuilds.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashing,
            model: None,
            dimension: None,
            base_url: None,
            api_key: None,
            batch_size: 256,
            cache_enabled: true,
            cache_max_entries: 10_000,
        }
    }
}

impl EmbeddingConfig {
    /// Instantiate the configured provider.
    ///
    /// Fails with [`RetrievalError::ModelUnavailable`] when the provider
    /// cannot serve requests; callers should treat that as fatal.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.provider {
            EmbeddingProviderType::Hashing => {
                let dimension = self.dimension.unwrap_or(HashingProvider::DEFAULT_DIMENSION);
                let provider = HashingProvider::new(dimension)
                    .map_err(|e| RetrievalError::ModelUnavailable(e.to_string()))?;
                Arc::new(provider)
            }
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new().with_batch_size(self.batch_size);
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(dimension) = self.dimension {
                    provider = provider.with_dimension(dimension);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                if let Some(key) = &self.api_key {
                    provider = provider.with_api_key(key);
                }
                if !provider.is_available() {
                    return Err(RetrievalError::ModelUnavailable(
                        "openai provider has no API key".to_string(),
                    ));
                }

                if self.cache_enabled {
                    Arc::new(CachedProvider::new(
                        provider,
                        EmbeddingCache::new(self.cache_max_entries),
                    ))
                } else {
                    Arc::new(provider)
                }
            }
        };

        info!(
            "Embedding provider ready: {} ({}, {} dimensions)",
            provider.name(),
            provider.model(),
            provider.dimension()
        );
        Ok(provider)
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Local feature-hashing embedder.
    Hashing,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.relevance_threshold, DEFAULT_RELEVANCE_THRESHOLD);
        assert_eq!(config.answer_timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh_interval(), None);
        assert_eq!(config.member_threshold, DEFAULT_MEMBER_THRESHOLD);
        assert!(config.member_matching);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: RetrievalConfig = serde_json::from_value(serde_json::json!({
            "relevance_threshold": 0.5,
            "embedding": { "provider": "openai", "model": "text-embedding-3-large" }
        }))
        .unwrap();

        assert_eq!(config.relevance_threshold, 0.5);
        assert_eq!(config.answer_timeout_ms, DEFAULT_ANSWER_TIMEOUT_MS);
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(config.embedding.batch_size, 256);
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = RetrievalConfig::default().with_threshold(1.5);
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = RetrievalConfig::default().with_threshold(f32::NAN);
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = RetrievalConfig {
            member_threshold: -2.0,
            ..RetrievalConfig::default()
        };
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_hashing_provider_from_config() {
        let config = EmbeddingConfig {
            dimension: Some(128),
            ..EmbeddingConfig::default()
        };
        let provider = config.build_provider().unwrap();
        assert_eq!(provider.name(), "hashing");
        assert_eq!(provider.dimension(), 128);
        assert_eq!(provider.model(), "hashing-v1-d128");
    }

    #[test]
    fn test_zero_dimension_is_model_unavailable() {
        let config = EmbeddingConfig {
            dimension: Some(0),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            config.build_provider(),
            Err(RetrievalError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_openai_with_key_is_cached() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::OpenAI,
            api_key: Some("sk-test".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider = config.build_provider().unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.dimension(), 1536);
    }
}
