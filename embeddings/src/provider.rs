//! Embedding providers.
//!
//! Every provider maps text to a vector of fixed dimension for a given model.
//! Batch and single calls must agree numerically for the same text.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model identity, including anything that changes the vector space.
    fn model(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    ///
    /// Empty text yields the zero vector.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        // Default implementation: process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Check if the provider can serve requests (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// Default model for the OpenAI provider.
pub const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// OpenAI-compatible embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model sent with every request.
    model: String,

    /// Expected vector length.
    dimension: usize,

    /// Maximum inputs per batch request.
    batch_size: usize,

    /// Whether the dimension was chosen explicitly and must be requested.
    request_dimension: bool,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider, reading the key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            dimension: default_dimension_for(OPENAI_DEFAULT_MODEL),
            batch_size: 256,
            request_dimension: false,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model, resetting the dimension to that model's default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.dimension = default_dimension_for(&self.model);
        self
    }

    /// Override the expected dimension. It is also sent to the API so that
    /// models supporting shortened vectors return exactly this length.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self.request_dimension = true;
        self
    }

    /// Set the maximum number of inputs per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed non-empty texts in one request, returning vectors in input order.
    async fn request(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            EmbeddingError::ModelUnavailable("OPENAI_API_KEY is not set".to_string())
        })?;

        debug!(
            "Requesting {} embeddings with model: {}",
            inputs.len(),
            self.model
        );

        let mut body = serde_json::json!({
            "input": inputs,
            "model": self.model,
        });
        if self.request_dimension {
            body["dimensions"] = serde_json::json!(self.dimension);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        if result.data.len() != inputs.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                result.data.len()
            )));
        }

        // The API does not promise response order.
        result.data.sort_by_key(|item| item.index);

        result
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() != self.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        actual: item.embedding.len(),
                    });
                }
                Ok(item.embedding)
            })
            .collect()
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let mut embeddings = self.request(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];

        // Empty texts never reach the API; they keep their zero vector.
        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(i, text)| (i, text.as_str()))
            .collect();

        for chunk in pending.chunks(self.batch_size) {
            let inputs: Vec<&str> = chunk.iter().map(|(_, text)| *text).collect();
            let embeddings = self.request(&inputs).await?;
            for ((slot, _), embedding) in chunk.iter().zip(embeddings) {
                results[*slot] = embedding;
            }
        }

        info!("Generated {} batch embeddings", texts.len());
        Ok(results)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Native dimension of well-known OpenAI embedding models.
pub fn default_dimension_for(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
